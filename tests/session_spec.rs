use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fba_planner::config::SessionConfig;
use fba_planner::db::Database;
use fba_planner::models::*;
use fba_planner::pricing;
use fba_planner::session::{
    AppState, LocalBackend, PricingEngine, ProjectStore, Session, SessionHandle, SettingsStore,
};
use fba_planner::{Error, Result};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// In-memory backend whose pricing and load calls can be delayed to force
/// a particular response order.
struct ScriptedBackend {
    inner: LocalBackend,
    calc_delays: Mutex<VecDeque<Duration>>,
    load_delays: Mutex<VecDeque<Duration>>,
    calculations: Mutex<Vec<CalculatorDocument>>,
    reject_settings_updates: bool,
}

impl ScriptedBackend {
    fn new(db: Database) -> Self {
        Self {
            inner: LocalBackend::new(db),
            calc_delays: Mutex::new(VecDeque::new()),
            load_delays: Mutex::new(VecDeque::new()),
            calculations: Mutex::new(Vec::new()),
            reject_settings_updates: false,
        }
    }

    fn delay_calculations(&self, delays: &[u64]) {
        let mut queue = self.calc_delays.lock().unwrap();
        queue.extend(delays.iter().map(|ms| Duration::from_millis(*ms)));
    }

    fn delay_loads(&self, delays: &[u64]) {
        let mut queue = self.load_delays.lock().unwrap();
        queue.extend(delays.iter().map(|ms| Duration::from_millis(*ms)));
    }

    fn calculations(&self) -> Vec<CalculatorDocument> {
        self.calculations.lock().unwrap().clone()
    }
}

#[async_trait]
impl PricingEngine for ScriptedBackend {
    async fn calculate(&self, document: &CalculatorDocument) -> Result<CalculationResult> {
        self.calculations.lock().unwrap().push(document.clone());
        let delay = self.calc_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.calculate(document).await
    }
}

#[async_trait]
impl SettingsStore for ScriptedBackend {
    async fn get_settings(&self) -> Result<Settings> {
        self.inner.get_settings().await
    }

    async fn update_settings(&self, settings: Settings) -> Result<Settings> {
        if self.reject_settings_updates {
            return Err(Error::remote("settings store unavailable"));
        }
        self.inner.update_settings(settings).await
    }
}

#[async_trait]
impl ProjectStore for ScriptedBackend {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.inner.list_projects().await
    }

    async fn get_project(&self, id: Uuid) -> Result<ProjectSnapshot> {
        let delay = self.load_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get_project(id).await
    }

    async fn create_project(
        &self,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> Result<ProjectSnapshot> {
        self.inner.create_project(meta, document).await
    }

    async fn update_project(
        &self,
        id: Uuid,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> Result<ProjectSnapshot> {
        self.inner.update_project(id, meta, document).await
    }

    async fn create_branch(&self, parent_id: Uuid, meta: ProjectMeta) -> Result<ProjectSnapshot> {
        self.inner.create_branch(parent_id, meta).await
    }

    async fn delete_project(&self, id: Uuid) -> Result<DeletedProjects> {
        self.inner.delete_project(id).await
    }
}

fn database() -> Database {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    db
}

fn spawn(backend: Arc<ScriptedBackend>) -> SessionHandle {
    let config = SessionConfig::default().with_debounce(DEBOUNCE);
    Session::spawn(backend, &config)
}

/// Wait for the start-up recompute to land.
async fn initialized(handle: &SessionHandle) -> AppState {
    let mut rx = handle.subscribe();
    let state = rx
        .wait_for(|s| !s.calculating && (s.result.is_some() || s.error.is_some()))
        .await
        .expect("session closed");
    state.clone()
}

fn meta(name: &str) -> ProjectMeta {
    ProjectMeta::new(name, "")
}

mod initialization {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn adopts_the_stored_exchange_rate_and_computes_once() {
        let db = database();
        db.update_settings(Settings {
            exchange_rate: ExchangeRate::from_decimal(dec!(7)),
        })
        .unwrap();
        let backend = Arc::new(ScriptedBackend::new(db));
        let handle = spawn(backend.clone());

        let state = initialized(&handle).await;
        assert_eq!(state.document.exchange_rate().value(), dec!(7));
        assert!(state.document.is_synced());
        assert!(state.error.is_none());
        assert!(state.projects.is_empty());
        assert_eq!(backend.calculations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lists_existing_projects() {
        let db = database();
        db.create_project(SaveProjectInput {
            meta: meta("Existing"),
            input: CalculatorDocument::default(),
        })
        .unwrap();
        let handle = spawn(Arc::new(ScriptedBackend::new(db)));

        let state = initialized(&handle).await;
        assert_eq!(state.projects.len(), 1);
    }
}

mod recompute {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bursts_of_edits_trigger_a_single_call() {
        let backend = Arc::new(ScriptedBackend::new(database()));
        let handle = spawn(backend.clone());
        initialized(&handle).await;

        for sales in [10, 11, 12] {
            assert_ok!(handle.edit(FieldUpdate::DailySales(sales)).await);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(backend.calculations().len(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let calls = backend.calculations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].during_sale.daily_sales, 12);

        let state = handle.view();
        assert!(!state.calculating);
        assert_eq!(state.result, Some(pricing::calculate(&calls[1]).unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_recalculate_skips_the_window() {
        let backend = Arc::new(ScriptedBackend::new(database()));
        let handle = spawn(backend.clone());
        initialized(&handle).await;

        assert_ok!(handle.edit(FieldUpdate::Quantity(40)).await);
        assert_ok!(handle.recalculate().await);
        assert_eq!(backend.calculations().len(), 2);

        // The pending window was cancelled by the manual call.
        tokio::time::sleep(DEBOUNCE * 3).await;
        assert_eq!(backend.calculations().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_latest_response_is_applied() {
        let backend = Arc::new(ScriptedBackend::new(database()));
        let handle = spawn(backend.clone());
        initialized(&handle).await;

        backend.delay_calculations(&[200, 50]);

        let first = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.recalculate().await })
        };
        tokio::task::yield_now().await;

        assert_ok!(handle.edit(FieldUpdate::Quantity(7)).await);
        assert_ok!(handle.recalculate().await);

        let stale = first.await.unwrap();
        assert!(matches!(stale, Err(Error::StaleResponse { seq: 2, latest: 3 })));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let state = handle.view();
        let latest = handle.view().document;
        assert_eq!(latest.pre_purchase.quantity, 7);
        assert_eq!(state.result, Some(pricing::calculate(&latest).unwrap()));
        assert!(!state.calculating);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_keep_the_previous_result() {
        let backend = Arc::new(ScriptedBackend::new(database()));
        let handle = spawn(backend.clone());
        let before = initialized(&handle).await;

        assert_ok!(handle.edit(FieldUpdate::ReferralFeeRate(dec!(150))).await);
        let err = assert_err!(handle.recalculate().await);
        assert!(matches!(err, Error::Validation(_)));

        let state = handle.view();
        assert_eq!(state.result, before.result);
        assert!(state.error.is_some());
        assert!(!state.calculating);
    }
}

mod editing {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn typed_money_syncs_and_flips() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        assert_ok!(
            handle
                .set_money(MoneyField::UnitCost, dec!(72.50), Currency::Cny)
                .await
        );
        let cost = handle.view().document.pre_purchase.unit_cost;
        assert_eq!(cost.usd, dec!(10.00));
        assert_eq!(cost.primary_currency, Currency::Cny);

        assert_ok!(handle.flip_currency(MoneyField::UnitCost).await);
        let cost = handle.view().document.pre_purchase.unit_cost;
        assert_eq!(cost.primary_currency, Currency::Usd);
        assert_eq!(cost.usd, dec!(10.00));
        assert_eq!(cost.cny, dec!(72.50));
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_rate_changes_resync_and_persist() {
        let db = database();
        let handle = spawn(Arc::new(ScriptedBackend::new(db.clone())));
        initialized(&handle).await;

        assert_ok!(
            handle
                .set_money(MoneyField::SellingPrice, dec!(20), Currency::Usd)
                .await
        );
        let applied = assert_ok!(handle.set_exchange_rate(7.0).await);
        assert_eq!(applied.value(), dec!(7));

        let doc = handle.view().document;
        assert_eq!(doc.during_sale.selling_price.cny, dec!(140));
        assert!(doc.is_synced());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(db.get_settings().unwrap().exchange_rate.value(), dec!(7));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_rates_fall_back_to_the_default() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let applied = assert_ok!(handle.set_exchange_rate(rate).await);
            assert_eq!(applied, ExchangeRate::DEFAULT);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_settings_updates_stay_silent() {
        let mut backend = ScriptedBackend::new(database());
        backend.reject_settings_updates = true;
        let handle = spawn(Arc::new(backend));
        initialized(&handle).await;

        assert_ok!(handle.set_exchange_rate(6.9).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.view().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn a_vanishing_exchange_rate_keeps_the_session_alive() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        assert_ok!(
            handle
                .set_money(MoneyField::UnitCost, dec!(1000000000), Currency::Cny)
                .await
        );
        assert_ok!(handle.set_exchange_rate(1e-20).await);
        assert_ok!(handle.edit(FieldUpdate::Quantity(1)).await);

        let err = assert_err!(handle.recalculate().await);
        assert!(matches!(err, Error::Validation(_)));
        assert!(handle.view().error.is_some());

        assert_ok!(handle.set_exchange_rate(7.25).await);
        assert_ok!(handle.recalculate().await);
        let state = handle.view();
        assert!(state.error.is_none());
        assert_eq!(state.document.pre_purchase.quantity, 1);
        assert_eq!(state.document.pre_purchase.unit_cost.usd, dec!(137931034.48));
    }

    #[tokio::test(start_paused = true)]
    async fn a_mode_edit_fills_in_a_missing_budget() {
        let db = database();
        let mut document = CalculatorDocument::default();
        document.during_sale.daily_ad_budget = None;
        let stored = db
            .create_project(SaveProjectInput {
                meta: meta("No budget"),
                input: document,
            })
            .unwrap();
        let handle = spawn(Arc::new(ScriptedBackend::new(db)));
        initialized(&handle).await;
        assert_ok!(handle.load(stored.id()).await);
        assert!(handle.view().document.during_sale.daily_ad_budget.is_none());

        assert_ok!(
            handle
                .edit(FieldUpdate::AdvertisingMode(AdvertisingMode::Budget))
                .await
        );
        assert_ok!(handle.recalculate().await);

        let state = handle.view();
        assert!(state.document.during_sale.daily_ad_budget.is_some());
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_advertising_mode_keeps_the_document_valid() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        assert_ok!(handle.set_advertising_mode(AdvertisingMode::Budget).await);
        assert_ok!(
            handle
                .set_money(MoneyField::DailyAdBudget, dec!(15), Currency::Usd)
                .await
        );
        assert_ok!(handle.recalculate().await);

        let state = handle.view();
        assert_eq!(state.document.during_sale.advertising_mode, AdvertisingMode::Budget);
        let advertising = state.result.map(|r| r.cost_breakdown.advertising_cost.usd);
        assert_eq!(advertising, Some(dec!(0)));
    }
}

mod projects {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn branch_then_delete_parent_removes_both() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        let p1 = assert_ok!(handle.save(meta("P1"), SaveMode::Create).await);
        assert_eq!(handle.view().current.map(|c| c.id), Some(p1.id()));

        assert_ok!(handle.select(Some(p1.id())).await);
        let p1a = assert_ok!(handle.branch(meta("P1a")).await);
        assert_eq!(p1a.summary.parent_id, Some(p1.id()));
        assert_eq!(handle.view().projects.len(), 2);

        let deleted = assert_ok!(handle.delete_selected().await);
        assert!(deleted.deleted_ids.contains(&p1.id()));
        assert!(deleted.deleted_ids.contains(&p1a.id()));

        let state = handle.view();
        assert!(state.projects.is_empty());
        assert!(state.current.is_none());
        assert!(state.selected_project_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn branch_copies_the_stored_snapshot_not_the_live_document() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        let p1 = assert_ok!(handle.save(meta("P1"), SaveMode::Create).await);
        assert_ok!(handle.edit(FieldUpdate::Quantity(77)).await);
        assert_ok!(handle.recalculate().await);
        assert_ok!(handle.select(Some(p1.id())).await);
        let before = handle.view();

        let branch = assert_ok!(handle.branch(meta("P1a")).await);
        assert_eq!(branch.document, p1.document);
        assert_eq!(branch.result, p1.result);
        assert_ne!(branch.document.pre_purchase.quantity, 77);

        let after = handle.view();
        assert_eq!(after.document, before.document);
        assert_eq!(after.document.pre_purchase.quantity, 77);
        assert_eq!(after.result, before.result);
        assert_eq!(after.current, before.current);
        assert_eq!(after.current.map(|c| c.id), Some(p1.id()));
        assert_eq!(after.selected_project_id, Some(p1.id()));
        assert_eq!(after.projects.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_an_unrelated_project_keeps_current() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        let p1 = assert_ok!(handle.save(meta("P1"), SaveMode::Create).await);
        let p2 = assert_ok!(handle.save(meta("P2"), SaveMode::Create).await);
        assert_ok!(handle.select(Some(p1.id())).await);
        let document = handle.view().document;

        assert_ok!(handle.delete_selected().await);

        let state = handle.view();
        assert_eq!(state.current.map(|c| c.id), Some(p2.id()));
        assert_eq!(state.document, document);
        assert_eq!(state.projects.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_overwrites_the_current_project() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        let saved = assert_ok!(handle.save(meta("Draft"), SaveMode::Create).await);
        assert_ok!(handle.edit(FieldUpdate::Quantity(250)).await);
        let updated = assert_ok!(handle.save(meta("Final"), SaveMode::Update).await);

        assert_eq!(updated.id(), saved.id());
        assert_eq!(updated.summary.branch_path, saved.summary.branch_path);
        assert_eq!(updated.document.pre_purchase.quantity, 250);
        assert_eq!(handle.view().current.map(|c| c.meta.name), Some("Final".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn loading_resyncs_under_the_snapshot_rate() {
        let db = database();
        let mut document = CalculatorDocument::default();
        document.settings.exchange_rate = ExchangeRate::from_decimal(dec!(7));
        document.during_sale.selling_price = MoneyValue {
            usd: dec!(10),
            cny: dec!(1),
            primary_currency: Currency::Usd,
        };
        let stored = db
            .create_project(SaveProjectInput {
                meta: meta("Seven"),
                input: document,
            })
            .unwrap();

        let handle = spawn(Arc::new(ScriptedBackend::new(db)));
        initialized(&handle).await;
        assert_ok!(handle.load(stored.id()).await);

        let state = handle.view();
        assert_eq!(state.document.exchange_rate().value(), dec!(7));
        assert_eq!(state.document.during_sale.selling_price.cny, dec!(70));
        assert_eq!(state.result, Some(stored.result));
        assert_eq!(state.current.map(|c| c.id), Some(stored.summary.id));
        assert!(!state.calculating);
    }

    #[tokio::test(start_paused = true)]
    async fn a_later_recompute_supersedes_a_slow_load() {
        let db = database();
        let stored = db
            .create_project(SaveProjectInput {
                meta: meta("Slow"),
                input: CalculatorDocument::default(),
            })
            .unwrap();
        let backend = Arc::new(ScriptedBackend::new(db));
        let handle = spawn(backend.clone());
        initialized(&handle).await;

        backend.delay_loads(&[200]);
        let load = {
            let handle = handle.clone();
            let id = stored.id();
            tokio::spawn(async move { handle.load(id).await })
        };
        tokio::task::yield_now().await;

        assert_ok!(handle.edit(FieldUpdate::Quantity(3)).await);
        assert_ok!(handle.recalculate().await);
        assert!(matches!(load.await.unwrap(), Err(Error::StaleResponse { .. })));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let state = handle.view();
        assert!(state.current.is_none());
        assert_eq!(state.document.pre_purchase.quantity, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn a_load_supersedes_a_slow_recompute() {
        let db = database();
        let stored = db
            .create_project(SaveProjectInput {
                meta: meta("Fast"),
                input: CalculatorDocument::default(),
            })
            .unwrap();
        let backend = Arc::new(ScriptedBackend::new(db));
        let handle = spawn(backend.clone());
        initialized(&handle).await;

        backend.delay_calculations(&[200]);
        assert_ok!(handle.edit(FieldUpdate::Quantity(9)).await);
        let recompute = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.recalculate().await })
        };
        tokio::task::yield_now().await;

        assert_ok!(handle.load(stored.id()).await);
        assert!(matches!(recompute.await.unwrap(), Err(Error::StaleResponse { .. })));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let state = handle.view();
        assert_eq!(state.result, Some(stored.result));
        assert_eq!(state.document.pre_purchase.quantity, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_precondition_is_an_error() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        let err = assert_err!(handle.save(meta("Nothing"), SaveMode::Update).await);
        assert!(matches!(err, Error::Precondition(_)));
        assert_eq!(handle.view().error, Some(err.to_string()));

        let err = assert_err!(handle.branch(meta("Nothing")).await);
        assert!(matches!(err, Error::Precondition(_)));

        let err = assert_err!(handle.delete_selected().await);
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_picks_up_projects_saved_elsewhere() {
        let db = database();
        let handle = spawn(Arc::new(ScriptedBackend::new(db.clone())));
        initialized(&handle).await;

        db.create_project(SaveProjectInput {
            meta: meta("Elsewhere"),
            input: CalculatorDocument::default(),
        })
        .unwrap();
        assert!(handle.view().projects.is_empty());

        assert_ok!(handle.refresh_projects().await);
        assert_eq!(handle.view().projects.len(), 1);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn commands_fail_after_shutdown() {
        let handle = spawn(Arc::new(ScriptedBackend::new(database())));
        initialized(&handle).await;

        handle.shutdown().await;
        let err = assert_err!(handle.edit(FieldUpdate::Quantity(1)).await);
        assert!(matches!(err, Error::Remote(_)));
    }
}

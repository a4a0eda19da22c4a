use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use uuid::Uuid;

use super::backend::Backend;
use super::debounce::Debouncer;
use super::sequence::Sequencer;
use super::state::{AppState, Transition};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::models::*;

type Reply<T> = oneshot::Sender<Result<T>>;
type Listing = Result<Vec<ProjectSummary>>;

enum Command {
    Edit {
        update: FieldUpdate,
        reply: Reply<()>,
    },
    SetMoney {
        field: MoneyField,
        amount: Decimal,
        currency: Currency,
        reply: Reply<()>,
    },
    FlipCurrency {
        field: MoneyField,
        reply: Reply<()>,
    },
    SetExchangeRate {
        rate: f64,
        reply: Reply<ExchangeRate>,
    },
    SetAdvertisingMode {
        mode: AdvertisingMode,
        reply: Reply<()>,
    },
    Recalculate {
        reply: Reply<()>,
    },
    RefreshProjects {
        reply: Reply<()>,
    },
    Select {
        id: Option<Uuid>,
        reply: Reply<()>,
    },
    Load {
        id: Uuid,
        reply: Reply<()>,
    },
    Save {
        meta: ProjectMeta,
        mode: SaveMode,
        reply: Reply<ProjectSnapshot>,
    },
    Branch {
        meta: ProjectMeta,
        reply: Reply<ProjectSnapshot>,
    },
    DeleteSelected {
        reply: Reply<DeletedProjects>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// A spawned backend call reporting back to the session loop.
enum Completion {
    Calculated {
        seq: u64,
        /// `None` when a newer call cancelled this one.
        outcome: Option<Result<CalculationResult>>,
        reply: Option<Reply<()>>,
    },
    Loaded {
        seq: u64,
        outcome: Option<Result<ProjectSnapshot>>,
        reply: Reply<()>,
    },
    Listed {
        outcome: Listing,
        reply: Reply<()>,
    },
    Saved {
        outcome: Result<(ProjectSnapshot, Listing)>,
        reply: Reply<ProjectSnapshot>,
    },
    Branched {
        outcome: Result<(ProjectSnapshot, Listing)>,
        reply: Reply<ProjectSnapshot>,
    },
    Deleted {
        outcome: Result<(DeletedProjects, Listing)>,
        reply: Reply<DeletedProjects>,
    },
}

enum Event {
    Command(Option<Command>),
    Completion(Completion),
    DebounceElapsed,
}

/// The editing session actor.
///
/// Owns the [`AppState`] and is the only thing that changes it. Commands
/// arrive from [`SessionHandle`]s; backend calls run in spawned tasks and
/// report back as completions, so one loop step never waits on the network.
pub struct Session {
    backend: Arc<dyn Backend>,
    state: AppState,
    sequencer: Sequencer,
    debounce: Debouncer,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    state_tx: watch::Sender<AppState>,
}

impl Session {
    /// Start a session on the current runtime.
    ///
    /// Initialization (shared exchange rate, project list, first recompute)
    /// runs before the first command is handled.
    pub fn spawn(backend: Arc<dyn Backend>, config: &SessionConfig) -> SessionHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(AppState::default());

        let session = Session {
            backend,
            state: AppState::default(),
            sequencer: Sequencer::new(),
            debounce: Debouncer::new(config.debounce),
            commands,
            completions_tx,
            completions,
            state_tx,
        };
        tokio::spawn(session.run());

        SessionHandle {
            commands: commands_tx,
            state: state_rx,
        }
    }

    async fn run(mut self) {
        tracing::info!("Session started");
        self.initialize().await;
        self.publish();

        loop {
            let deadline = self.debounce.deadline();
            let event = tokio::select! {
                cmd = self.commands.recv() => Event::Command(cmd),
                Some(done) = self.completions.recv() => Event::Completion(done),
                _ = sleep_until(deadline) => Event::DebounceElapsed,
            };

            match event {
                Event::Command(Some(Command::Shutdown { ack })) => {
                    let _ = ack.send(());
                    break;
                }
                // Every handle dropped
                Event::Command(None) => break,
                Event::Command(Some(cmd)) => self.handle_command(cmd),
                Event::Completion(done) => self.handle_completion(done),
                Event::DebounceElapsed => {
                    if self.debounce.fire(Instant::now()) {
                        tracing::debug!("Debounce window elapsed");
                        self.dispatch_recompute(None);
                    }
                }
            }
            self.publish();
        }

        self.debounce.cancel();
        tracing::info!("Session stopped");
    }

    async fn initialize(&mut self) {
        match self.backend.get_settings().await {
            Ok(settings) => self
                .state
                .apply(Transition::SetExchangeRate(settings.exchange_rate)),
            Err(e) => {
                tracing::warn!("Failed to fetch settings: {}", e);
                self.state.apply(Transition::Failed(e));
                let rate = self.state.document.exchange_rate();
                self.state.apply(Transition::SetExchangeRate(rate));
            }
        }

        let listing = self.backend.list_projects().await;
        self.apply_listing(listing);

        self.dispatch_recompute(None);
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn fail<T>(&mut self, err: Error, reply: Reply<T>) {
        self.state.apply(Transition::Failed(err.clone()));
        let _ = reply.send(Err(err));
    }

    /// Apply a local edit and restart the recompute window.
    fn edit(&mut self, transition: Transition, reply: Reply<()>) {
        self.state.apply(transition);
        self.debounce.trigger();
        let _ = reply.send(Ok(()));
    }

    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = done.send(call.await);
        });
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Edit { update, reply } => {
                tracing::debug!("Edit {}", update.path());
                self.edit(Transition::Edit(update), reply);
            }
            Command::SetMoney {
                field,
                amount,
                currency,
                reply,
            } => {
                let value = MoneyValue::entered(amount, currency, self.state.document.exchange_rate());
                self.edit(Transition::Edit(FieldUpdate::Money(field, value)), reply);
            }
            Command::FlipCurrency { field, reply } => {
                let rate = self.state.document.exchange_rate();
                match field.get(&self.state.document) {
                    Some(value) => {
                        let update = FieldUpdate::Money(field, value.flipped(rate));
                        self.edit(Transition::Edit(update), reply);
                    }
                    None => self.fail(
                        Error::precondition(format!("{field} is not set")),
                        reply,
                    ),
                }
            }
            Command::SetExchangeRate { rate, reply } => {
                let rate = ExchangeRate::clamp(rate);
                self.state.apply(Transition::SetExchangeRate(rate));
                self.debounce.trigger();

                let backend = self.backend.clone();
                tokio::spawn(async move {
                    if let Err(e) = backend.update_settings(Settings { exchange_rate: rate }).await {
                        tracing::warn!("Failed to store exchange rate {}: {}", rate, e);
                    }
                });
                let _ = reply.send(Ok(rate));
            }
            Command::SetAdvertisingMode { mode, reply } => {
                self.edit(Transition::SetAdvertisingMode(mode), reply);
            }
            Command::Recalculate { reply } => self.dispatch_recompute(Some(reply)),
            Command::RefreshProjects { reply } => {
                let backend = self.backend.clone();
                self.spawn_call(async move {
                    Completion::Listed {
                        outcome: backend.list_projects().await,
                        reply,
                    }
                });
            }
            Command::Select { id, reply } => {
                self.state.apply(Transition::Select(id));
                let _ = reply.send(Ok(()));
            }
            Command::Load { id, reply } => self.dispatch_load(id, reply),
            Command::Save { meta, mode, reply } => self.save(meta, mode, reply),
            Command::Branch { meta, reply } => {
                let Some(parent_id) = self.state.selected_project_id else {
                    return self.fail(
                        Error::precondition("select a project to branch from"),
                        reply,
                    );
                };
                let backend = self.backend.clone();
                self.spawn_call(async move {
                    let outcome = match backend.create_branch(parent_id, meta).await {
                        Ok(branch) => Ok((branch, backend.list_projects().await)),
                        Err(e) => Err(e),
                    };
                    Completion::Branched { outcome, reply }
                });
            }
            Command::DeleteSelected { reply } => {
                let Some(id) = self.state.selected_project_id else {
                    return self.fail(Error::precondition("select a project to delete"), reply);
                };
                let backend = self.backend.clone();
                self.spawn_call(async move {
                    let outcome = match backend.delete_project(id).await {
                        Ok(deleted) => Ok((deleted, backend.list_projects().await)),
                        Err(e) => Err(e),
                    };
                    Completion::Deleted { outcome, reply }
                });
            }
            Command::Shutdown { ack } => {
                let _ = ack.send(());
            }
        }
    }

    fn save(&mut self, meta: ProjectMeta, mode: SaveMode, reply: Reply<ProjectSnapshot>) {
        let target = match mode {
            SaveMode::Create => None,
            SaveMode::Update => match &self.state.current {
                Some(current) => Some(current.id),
                None => {
                    return self.fail(Error::precondition("no project is loaded to update"), reply);
                }
            },
        };

        let backend = self.backend.clone();
        let document = self.state.document.clone();
        self.spawn_call(async move {
            let saved = match target {
                Some(id) => backend.update_project(id, meta, document).await,
                None => backend.create_project(meta, document).await,
            };
            let outcome = match saved {
                Ok(saved) => Ok((saved, backend.list_projects().await)),
                Err(e) => Err(e),
            };
            Completion::Saved { outcome, reply }
        });
    }

    fn dispatch_recompute(&mut self, reply: Option<Reply<()>>) {
        self.debounce.cancel();
        let ticket = self.sequencer.issue();
        self.state.apply(Transition::RecomputeDispatched);
        tracing::debug!("Dispatching recompute #{}", ticket.seq());

        let backend = self.backend.clone();
        let document = self.state.document.clone();
        self.spawn_call(async move {
            let outcome = tokio::select! {
                _ = ticket.cancelled() => None,
                result = backend.calculate(&document) => Some(result),
            };
            Completion::Calculated {
                seq: ticket.seq(),
                outcome,
                reply,
            }
        });
    }

    fn dispatch_load(&mut self, id: Uuid, reply: Reply<()>) {
        self.debounce.cancel();
        let ticket = self.sequencer.issue();
        self.state.apply(Transition::LoadDispatched);
        tracing::debug!("Dispatching load of {} as #{}", id, ticket.seq());

        let backend = self.backend.clone();
        self.spawn_call(async move {
            let outcome = tokio::select! {
                _ = ticket.cancelled() => None,
                result = backend.get_project(id) => Some(result),
            };
            Completion::Loaded {
                seq: ticket.seq(),
                outcome,
                reply,
            }
        });
    }

    /// Gate a sequenced response: `Err` with the stale error if a newer call
    /// was dispatched, otherwise settle the sequence.
    fn accept(&mut self, seq: u64) -> Result<()> {
        if let Err(stale) = self.sequencer.check(seq) {
            tracing::debug!("Dropping {}", stale);
            return Err(stale);
        }
        self.sequencer.settle(seq);
        Ok(())
    }

    fn finish_sequenced<T>(&mut self, seq: u64, outcome: Option<Result<T>>) -> Result<T> {
        let result = match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => {
                self.state.apply(Transition::Failed(e.clone()));
                Err(e)
            }
            None => Err(Error::StaleResponse {
                seq,
                latest: self.sequencer.latest(),
            }),
        };
        self.state.apply(Transition::Settled {
            calculating: self.sequencer.is_pending(),
        });
        result
    }

    fn apply_listing(&mut self, listing: Listing) {
        match listing {
            Ok(summaries) => self.state.apply(Transition::ProjectsListed(summaries)),
            Err(e) => {
                tracing::warn!("Failed to list projects: {}", e);
                self.state.apply(Transition::Failed(e));
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Calculated {
                seq,
                outcome,
                reply,
            } => {
                let result = self.accept(seq).and_then(|()| {
                    let result = self.finish_sequenced(seq, outcome)?;
                    self.state.apply(Transition::ResultArrived(result));
                    Ok(())
                });
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Completion::Loaded {
                seq,
                outcome,
                reply,
            } => {
                let result = self.accept(seq).and_then(|()| {
                    let snapshot = self.finish_sequenced(seq, outcome)?;
                    tracing::info!("Loaded project {}", snapshot.summary.branch_path);
                    self.state.apply(Transition::ProjectLoaded(snapshot));
                    Ok(())
                });
                let _ = reply.send(result);
            }
            Completion::Listed { outcome, reply } => {
                let result = match outcome {
                    Ok(summaries) => {
                        self.state.apply(Transition::ProjectsListed(summaries));
                        Ok(())
                    }
                    Err(e) => {
                        self.state.apply(Transition::Failed(e.clone()));
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            Completion::Saved { outcome, reply } => match outcome {
                Ok((saved, listing)) => {
                    self.state.apply(Transition::Saved(saved.clone()));
                    self.apply_listing(listing);
                    let _ = reply.send(Ok(saved));
                }
                Err(e) => self.fail(e, reply),
            },
            Completion::Branched { outcome, reply } => match outcome {
                Ok((branch, listing)) => {
                    self.apply_listing(listing);
                    let _ = reply.send(Ok(branch));
                }
                Err(e) => self.fail(e, reply),
            },
            Completion::Deleted { outcome, reply } => match outcome {
                Ok((deleted, listing)) => {
                    tracing::info!("Deleted {} project(s)", deleted.deleted_ids.len());
                    self.state.apply(Transition::Deleted(deleted.clone()));
                    self.apply_listing(listing);
                    let _ = reply.send(Ok(deleted));
                }
                Err(e) => self.fail(e, reply),
            },
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable front end of a [`Session`].
///
/// Every method waits for the session to handle the command. Edits return
/// once applied locally; backend-bound operations return once their
/// response has been applied (or rejected).
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AppState>,
}

fn closed() -> Error {
    Error::remote("session is closed")
}

impl SessionHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(command(tx)).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    pub async fn edit(&self, update: FieldUpdate) -> Result<()> {
        self.request(|reply| Command::Edit { update, reply }).await
    }

    /// Type `amount` into the `currency` side of a money field.
    pub async fn set_money(
        &self,
        field: MoneyField,
        amount: Decimal,
        currency: Currency,
    ) -> Result<()> {
        self.request(|reply| Command::SetMoney {
            field,
            amount,
            currency,
            reply,
        })
        .await
    }

    /// Make the other currency of `field` primary, keeping its displayed amount.
    pub async fn flip_currency(&self, field: MoneyField) -> Result<()> {
        self.request(|reply| Command::FlipCurrency { field, reply })
            .await
    }

    /// Returns the rate actually applied after clamping.
    pub async fn set_exchange_rate(&self, rate: f64) -> Result<ExchangeRate> {
        self.request(|reply| Command::SetExchangeRate { rate, reply })
            .await
    }

    pub async fn set_advertising_mode(&self, mode: AdvertisingMode) -> Result<()> {
        self.request(|reply| Command::SetAdvertisingMode { mode, reply })
            .await
    }

    /// Recompute now, skipping the debounce window.
    pub async fn recalculate(&self) -> Result<()> {
        self.request(|reply| Command::Recalculate { reply }).await
    }

    pub async fn refresh_projects(&self) -> Result<()> {
        self.request(|reply| Command::RefreshProjects { reply })
            .await
    }

    pub async fn select(&self, id: Option<Uuid>) -> Result<()> {
        self.request(|reply| Command::Select { id, reply }).await
    }

    pub async fn load(&self, id: Uuid) -> Result<()> {
        self.request(|reply| Command::Load { id, reply }).await
    }

    pub async fn save(&self, meta: ProjectMeta, mode: SaveMode) -> Result<ProjectSnapshot> {
        self.request(|reply| Command::Save { meta, mode, reply })
            .await
    }

    /// Branch off the selected project.
    pub async fn branch(&self, meta: ProjectMeta) -> Result<ProjectSnapshot> {
        self.request(|reply| Command::Branch { meta, reply }).await
    }

    pub async fn delete_selected(&self) -> Result<DeletedProjects> {
        self.request(|reply| Command::DeleteSelected { reply })
            .await
    }

    pub fn view(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.clone()
    }

    /// Stop the session. In-flight backend calls are left to finish on
    /// their own; their results are discarded.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { ack }).is_ok() {
            let _ = done.await;
        }
    }
}

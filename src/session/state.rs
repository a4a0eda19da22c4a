use serde::Serialize;
use uuid::Uuid;

use crate::error::Error;
use crate::models::*;

/// The snapshot the editing document was last loaded from or saved as.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentProject {
    pub id: Uuid,
    #[serde(flatten)]
    pub meta: ProjectMeta,
}

impl From<&ProjectSnapshot> for CurrentProject {
    fn from(snapshot: &ProjectSnapshot) -> Self {
        Self {
            id: snapshot.id(),
            meta: snapshot.meta(),
        }
    }
}

/// Everything an editing session shows.
///
/// Only [`AppState::apply`] changes it; the session publishes a clone after
/// every step.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub document: CalculatorDocument,
    pub result: Option<CalculationResult>,
    pub calculating: bool,
    pub error: Option<String>,
    pub projects: ProjectForest,
    pub selected_project_id: Option<Uuid>,
    pub current: Option<CurrentProject>,
}

#[derive(Debug, Clone)]
pub enum Transition {
    Edit(FieldUpdate),
    SetExchangeRate(ExchangeRate),
    SetAdvertisingMode(AdvertisingMode),
    RecomputeDispatched,
    LoadDispatched,
    ResultArrived(CalculationResult),
    ProjectLoaded(ProjectSnapshot),
    /// The latest sequenced call resolved, or it is still outstanding.
    Settled { calculating: bool },
    ProjectsListed(Vec<ProjectSummary>),
    Select(Option<Uuid>),
    Saved(ProjectSnapshot),
    Deleted(DeletedProjects),
    Failed(Error),
}

impl AppState {
    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Edit(FieldUpdate::AdvertisingMode(mode)) => {
                self.document = self.document.with_advertising_mode(mode);
            }
            Transition::Edit(update) => {
                let rate = self.document.exchange_rate();
                let update = match update {
                    FieldUpdate::Money(field, value) => {
                        FieldUpdate::Money(field, value.synced(rate))
                    }
                    other => other,
                };
                self.document = set_field(&self.document, update);
            }
            Transition::SetExchangeRate(rate) => {
                self.document = self.document.with_exchange_rate(rate);
            }
            Transition::SetAdvertisingMode(mode) => {
                self.document = self.document.with_advertising_mode(mode);
            }
            Transition::RecomputeDispatched => {
                self.calculating = true;
                self.error = None;
            }
            Transition::LoadDispatched => {
                self.calculating = true;
            }
            Transition::ResultArrived(result) => {
                self.result = Some(result);
            }
            Transition::ProjectLoaded(snapshot) => {
                self.current = Some(CurrentProject::from(&snapshot));
                self.document = snapshot.document.resynced();
                self.result = Some(snapshot.result);
            }
            Transition::Settled { calculating } => {
                self.calculating = calculating;
            }
            Transition::ProjectsListed(summaries) => {
                self.projects = ProjectForest::from_summaries(summaries);
            }
            Transition::Select(id) => {
                self.selected_project_id = id;
            }
            Transition::Saved(snapshot) => {
                self.current = Some(CurrentProject::from(&snapshot));
            }
            Transition::Deleted(deleted) => {
                if self
                    .current
                    .as_ref()
                    .is_some_and(|c| deleted.deleted_ids.contains(&c.id))
                {
                    self.current = None;
                }
                self.selected_project_id = None;
            }
            Transition::Failed(err) => {
                if err.is_user_visible() {
                    self.error = Some(err.to_string());
                }
            }
        }
    }
}

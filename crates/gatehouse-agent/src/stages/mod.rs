//! The form-submission state machine, one module per stage.
//!
//! Navigation state lives entirely in this process: a retried job starts
//! the flow from the beginning, never from the failed stage.

pub mod auth;
pub mod contact;
pub mod duration;
pub mod host;
pub mod identity;
pub mod navigate;
pub mod photo;
pub mod purpose;
pub mod search;
pub mod submit;

/// Stage names as they appear in run reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Authenticate,
    NavigateToForm,
    FillIdentity,
    AssociateHost,
    SelectPurposeAndGroup,
    FillContactAndDocument,
    ConfigureVisitDuration,
    UploadPhoto,
    Submit,
    ConfirmAndPersist,
    LocateRecord,
    Renew,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Init => "Init",
            Stage::Authenticate => "Authenticate",
            Stage::NavigateToForm => "NavigateToForm",
            Stage::FillIdentity => "FillIdentity",
            Stage::AssociateHost => "AssociateHost",
            Stage::SelectPurposeAndGroup => "SelectPurposeAndGroup",
            Stage::FillContactAndDocument => "FillContactAndDocument",
            Stage::ConfigureVisitDuration => "ConfigureVisitDuration",
            Stage::UploadPhoto => "UploadPhoto",
            Stage::Submit => "Submit",
            Stage::ConfirmAndPersist => "ConfirmAndPersist",
            Stage::LocateRecord => "LocateRecord",
            Stage::Renew => "Renew",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

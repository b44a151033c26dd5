//! The two automation strategies behind one task interface.
//!
//! Create fills the whole entry form; Reactivate locates an existing
//! record by document and re-runs only host association, duration and the
//! confirmation chain. The variant is selected from the payload's action
//! kind: one configurable implementation instead of parallel scripts.

use thirtyfour::WebDriver;

use gatehouse::exec::TaskSpec;
use gatehouse::job::ActionKind;

use crate::cancel::CancelToken;
use crate::error::{RunFailure, StageError};
use crate::session::AgentEnv;
use crate::stages::{
    auth, contact, duration, host, identity, navigate, photo, purpose, search, submit, Stage,
};

/// What the confirmation chain observed.
#[derive(Debug, Clone, Copy)]
pub struct SubmitFeedback {
    /// The console showed an explicit success message. When false the run
    /// still counts as a success, softly.
    pub explicit_success: bool,
}

#[allow(async_fn_in_trait)]
pub trait AutomationTask {
    fn kind(&self) -> &'static str;

    async fn run(
        &self,
        driver: &WebDriver,
        env: &AgentEnv,
        spec: &TaskSpec,
        cancel: &CancelToken,
    ) -> Result<SubmitFeedback, RunFailure>;
}

/// Runs the strategy matching the payload's action kind.
pub async fn run_for_action(
    driver: &WebDriver,
    env: &AgentEnv,
    spec: &TaskSpec,
    cancel: &CancelToken,
) -> Result<SubmitFeedback, RunFailure> {
    match spec.action {
        ActionKind::Create => CreateVisitor.run(driver, env, spec, cancel).await,
        ActionKind::Reactivate => ReactivateVisitor.run(driver, env, spec, cancel).await,
    }
}

/// Aborts before `next` starts when cancellation was requested. An
/// in-flight stage always completes; this is the between-stage poll.
fn checkpoint(cancel: &CancelToken, next: Stage) -> Result<(), RunFailure> {
    if cancel.is_requested() {
        tracing::warn!("Cancellation observed before {}", next);
        return Err(RunFailure::new(next, StageError::Cancelled));
    }
    Ok(())
}

fn fail(stage: Stage) -> impl FnOnce(StageError) -> RunFailure {
    move |error| RunFailure::new(stage, error)
}

/// Fresh registration through the unreserved-entry form.
pub struct CreateVisitor;

impl AutomationTask for CreateVisitor {
    fn kind(&self) -> &'static str {
        "create"
    }

    async fn run(
        &self,
        driver: &WebDriver,
        env: &AgentEnv,
        spec: &TaskSpec,
        cancel: &CancelToken,
    ) -> Result<SubmitFeedback, RunFailure> {
        checkpoint(cancel, Stage::Authenticate)?;
        auth::login(driver, env)
            .await
            .map_err(fail(Stage::Authenticate))?;

        checkpoint(cancel, Stage::NavigateToForm)?;
        navigate::to_entry_form(driver)
            .await
            .map_err(fail(Stage::NavigateToForm))?;

        checkpoint(cancel, Stage::FillIdentity)?;
        identity::fill(driver, &spec.name)
            .await
            .map_err(fail(Stage::FillIdentity))?;

        if let Some(host_name) = &spec.host_name {
            checkpoint(cancel, Stage::AssociateHost)?;
            host::associate(driver, host_name)
                .await
                .map_err(fail(Stage::AssociateHost))?;
        }

        checkpoint(cancel, Stage::SelectPurposeAndGroup)?;
        purpose::select_purpose_and_group(driver)
            .await
            .map_err(fail(Stage::SelectPurposeAndGroup))?;

        checkpoint(cancel, Stage::FillContactAndDocument)?;
        contact::fill(
            driver,
            spec.gender,
            &spec.phone,
            &spec.document,
            spec.vehicle_plate.as_deref(),
        )
        .await
        .map_err(fail(Stage::FillContactAndDocument))?;

        checkpoint(cancel, Stage::ConfigureVisitDuration)?;
        duration::configure(driver, spec.validity_days)
            .await
            .map_err(fail(Stage::ConfigureVisitDuration))?;

        if let Some(photo_path) = &spec.photo_path {
            checkpoint(cancel, Stage::UploadPhoto)?;
            photo::upload(driver, photo_path)
                .await
                .map_err(fail(Stage::UploadPhoto))?;
        }

        checkpoint(cancel, Stage::Submit)?;
        submit::submit_entry(driver)
            .await
            .map_err(fail(Stage::Submit))?;

        checkpoint(cancel, Stage::ConfirmAndPersist)?;
        let explicit = submit::confirm_and_persist(driver)
            .await
            .map_err(fail(Stage::ConfirmAndPersist))?;

        Ok(SubmitFeedback {
            explicit_success: explicit,
        })
    }
}

/// Renewal of an existing record located by identity document.
pub struct ReactivateVisitor;

impl AutomationTask for ReactivateVisitor {
    fn kind(&self) -> &'static str {
        "reactivate"
    }

    async fn run(
        &self,
        driver: &WebDriver,
        env: &AgentEnv,
        spec: &TaskSpec,
        cancel: &CancelToken,
    ) -> Result<SubmitFeedback, RunFailure> {
        checkpoint(cancel, Stage::Authenticate)?;
        auth::login(driver, env)
            .await
            .map_err(fail(Stage::Authenticate))?;

        checkpoint(cancel, Stage::NavigateToForm)?;
        navigate::to_visitor_info(driver)
            .await
            .map_err(fail(Stage::NavigateToForm))?;

        checkpoint(cancel, Stage::LocateRecord)?;
        search::find_by_document(driver, &spec.document)
            .await
            .map_err(fail(Stage::LocateRecord))?;

        checkpoint(cancel, Stage::Renew)?;
        search::open_renewal(driver)
            .await
            .map_err(fail(Stage::Renew))?;

        if let Some(host_name) = &spec.host_name {
            checkpoint(cancel, Stage::AssociateHost)?;
            host::associate(driver, host_name)
                .await
                .map_err(fail(Stage::AssociateHost))?;
        }

        checkpoint(cancel, Stage::ConfigureVisitDuration)?;
        duration::configure(driver, spec.validity_days)
            .await
            .map_err(fail(Stage::ConfigureVisitDuration))?;

        checkpoint(cancel, Stage::Submit)?;
        submit::submit_entry(driver)
            .await
            .map_err(fail(Stage::Submit))?;

        checkpoint(cancel, Stage::ConfirmAndPersist)?;
        let explicit = submit::confirm_and_persist(driver)
            .await
            .map_err(fail(Stage::ConfirmAndPersist))?;

        Ok(SubmitFeedback {
            explicit_success: explicit,
        })
    }
}

//! Reverting a previous apply.
//!
//! There is no separate execution path: the revert engine asks the registry
//! for the revert-direction selection and hands it to the same
//! [`Orchestrator`]. It needs nothing from the original run, so it works in
//! a later process.

use crate::config::RunConfiguration;
use crate::detect::Environment;
use crate::error::TranscriptError;
use crate::executor::{Orchestrator, RunResult, StopSignal};
use crate::registry::{StepCatalog, StepRegistry, build_registry};
use crate::transcript::TranscriptSink;
use crate::types::Mode;

pub struct RevertEngine<'a> {
    catalog: &'a StepCatalog,
    env: &'a Environment,
    cfg: RunConfiguration,
}

impl<'a> RevertEngine<'a> {
    /// `cfg` is used with its mode forced to revert.
    pub fn new(catalog: &'a StepCatalog, env: &'a Environment, cfg: &RunConfiguration) -> Self {
        Self {
            catalog,
            env,
            cfg: cfg.clone().with_mode(Mode::Revert),
        }
    }

    /// Steps that a revert run would touch, in execution order.
    pub fn registry(&self) -> StepRegistry<'a> {
        build_registry(self.catalog, self.env, &self.cfg)
    }

    pub fn run(
        &self,
        transcript: &mut dyn TranscriptSink,
        stop: StopSignal,
        plan_digest: Option<&str>,
    ) -> Result<RunResult, TranscriptError> {
        let registry = self.registry();
        let mut orchestrator =
            Orchestrator::new(self.env, &self.cfg, transcript).with_stop_signal(stop);
        if let Some(digest) = plan_digest {
            orchestrator = orchestrator.with_plan_digest(digest);
        }
        orchestrator.run(&registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Accelerator;
    use crate::error::StepError;
    use crate::executor::NO_REVERT_MESSAGE;
    use crate::step::{Action, ActionContext, ActionOutput, FnAction, StepDefinition};
    use crate::transcript::MemoryTranscript;
    use crate::types::{Category, OsFamily, RunStatus, StepStatus};
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    fn recorder(journal: &Journal, entry: &str) -> Box<dyn Action> {
        let journal = journal.clone();
        let entry = entry.to_string();
        Box::new(FnAction::new(entry.clone(), move |_: &ActionContext<'_>| {
            journal.lock().unwrap().push(entry.clone());
            Ok(ActionOutput::changed(entry.clone()))
        }))
    }

    fn env() -> Environment {
        Environment::new(OsFamily::Linux, "x86_64", Accelerator::None, true)
    }

    #[test]
    fn reverts_in_reverse_apply_order() {
        let journal: Journal = Arc::default();
        let mut catalog = StepCatalog::new();
        for (name, category) in [
            ("a", Category::Power),
            ("b", Category::Package),
            ("c", Category::EnvironmentVariable),
        ] {
            catalog
                .register(
                    StepDefinition::new(name, category, recorder(&journal, name))
                        .with_revert(recorder(&journal, &format!("undo-{name}"))),
                )
                .unwrap();
        }

        let env = env();
        // mode on the caller's config is ignored
        let cfg = RunConfiguration::new(Mode::Apply, "/tmp/a", "/tmp/t");
        let engine = RevertEngine::new(&catalog, &env, &cfg);
        let mut transcript = MemoryTranscript::new();
        let result = engine.run(&mut transcript, StopSignal::new(), None).unwrap();

        assert_eq!(result.mode, Mode::Revert);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["undo-c", "undo-b", "undo-a"]
        );
    }

    #[test]
    fn missing_revert_is_skipped_not_failed() {
        let journal: Journal = Arc::default();
        let mut catalog = StepCatalog::new();
        catalog
            .register(
                StepDefinition::new("venv", Category::Package, recorder(&journal, "venv"))
                    .with_revert(recorder(&journal, "undo-venv")),
            )
            .unwrap();
        catalog
            .register(StepDefinition::new(
                "cache-purge",
                Category::Filesystem,
                recorder(&journal, "purge"),
            ))
            .unwrap();

        let env = env();
        let cfg = RunConfiguration::new(Mode::Revert, "/tmp/a", "/tmp/t");
        let mut transcript = MemoryTranscript::new();
        let result = RevertEngine::new(&catalog, &env, &cfg)
            .run(&mut transcript, StopSignal::new(), Some("feedface00000000"))
            .unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        let skipped: Vec<_> = result
            .outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Skipped)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].step, "cache-purge");
        assert_eq!(skipped[0].message, NO_REVERT_MESSAGE);
        assert_eq!(*journal.lock().unwrap(), vec!["undo-venv"]);
        assert!(transcript.records()[0].message.contains("plan=feedface00000000"));
    }

    #[test]
    fn failing_revert_follows_severity() {
        let mut catalog = StepCatalog::new();
        catalog
            .register(
                StepDefinition::new(
                    "a",
                    Category::Power,
                    Box::new(FnAction::new("apply", |_: &ActionContext<'_>| {
                        Ok(ActionOutput::changed("applied"))
                    })),
                )
                .with_revert(Box::new(FnAction::new("revert", |_: &ActionContext<'_>| {
                    Err(StepError::failed("service not found"))
                }))),
            )
            .unwrap();

        let env = env();
        let cfg = RunConfiguration::new(Mode::Revert, "/tmp/a", "/tmp/t");
        let mut transcript = MemoryTranscript::new();
        let result = RevertEngine::new(&catalog, &env, &cfg)
            .run(&mut transcript, StopSignal::new(), None)
            .unwrap();
        assert_eq!(result.status, RunStatus::CompletedWithWarnings);
    }
}

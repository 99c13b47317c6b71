//! Shared wiring for the CLI commands: configuration, stores and registry

use super::steps::{QuickRequestHandler, SpecDocument, SpecDocumentHandler};
use anyhow::{anyhow, Context, Result};
use specloop_core::models::Configuration;
use specloop_core::session::{SessionLimits, SessionStore, SharedSessionStore};
use specloop_core::workflow::{
    handler_refs, load_definitions_dir, ApprovalGateway, JsonStateStore, ShellStepHandler,
    WorkflowEngine, WorkflowRegistry, SHELL_HANDLER_REF,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const WORKFLOW_STATE_FILE: &str = "workflow_state.json";
const SESSIONS_FILE: &str = "sessions.json";

/// Everything a command needs to know about where it runs
pub struct AppContext {
    pub config: Configuration,
    pub config_path: PathBuf,
    pub workspace: PathBuf,
}

impl AppContext {
    /// Load the configuration and resolve the workspace
    pub fn load(config_path: Option<PathBuf>, workspace: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => Configuration::default_config_path()
                .map_err(|e| anyhow!("Failed to resolve config path: {}", e))?,
        };
        let config = Configuration::load_from_file(&config_path)
            .map_err(|e| anyhow!("Failed to load config {}: {}", config_path.display(), e))?;
        if let Err(errors) = config.validate() {
            return Err(anyhow!(
                "Invalid configuration {}:\n  - {}",
                config_path.display(),
                errors.join("\n  - ")
            ));
        }

        let workspace = match workspace {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let workspace = workspace.canonicalize().unwrap_or(workspace);

        Ok(Self {
            config,
            config_path,
            workspace,
        })
    }

    /// Snapshot scope key: the absolute workspace path
    pub fn scope(&self) -> String {
        self.workspace.display().to_string()
    }

    pub fn state_store(&self) -> Result<Arc<JsonStateStore>> {
        let path = self.config.resolved_state_dir().join(WORKFLOW_STATE_FILE);
        let store = JsonStateStore::new(&path)
            .with_context(|| format!("Failed to open workflow state {}", path.display()))?;
        Ok(Arc::new(store))
    }

    pub fn session_store(&self) -> Result<SharedSessionStore> {
        let path = self.config.resolved_state_dir().join(SESSIONS_FILE);
        let store = SessionStore::open(&path, SessionLimits::from(&self.config))
            .with_context(|| format!("Failed to open session store {}", path.display()))?;
        Ok(Arc::new(Mutex::new(store)))
    }

    /// Built-in modes, user definitions from the workflows directory, and
    /// the handlers behind both
    pub fn registry(&self) -> Result<WorkflowRegistry> {
        let mut registry = WorkflowRegistry::with_builtin_modes();

        let workflows_dir = self.config.resolved_workflows_dir();
        for definition in load_definitions_dir(&workflows_dir)? {
            tracing::debug!(
                "Loaded workflow '{}' from {}",
                definition.name,
                workflows_dir.display()
            );
            registry.register(definition);
        }

        for (handler_ref, document) in [
            (handler_refs::REQUIREMENTS, SpecDocument::Requirements),
            (handler_refs::DESIGN, SpecDocument::Design),
            (handler_refs::TASKS, SpecDocument::Tasks),
        ] {
            registry.register_handler(
                handler_ref,
                Arc::new(SpecDocumentHandler::new(&self.workspace, document)),
            );
        }
        registry.register_handler(handler_refs::QUICK, Arc::new(QuickRequestHandler));
        registry.register_handler(
            SHELL_HANDLER_REF,
            Arc::new(ShellStepHandler::new().with_working_dir(&self.workspace)),
        );

        Ok(registry)
    }

    pub fn engine(&self, gateway: Arc<dyn ApprovalGateway>) -> Result<Arc<WorkflowEngine>> {
        let engine = WorkflowEngine::new(
            &self.scope(),
            Arc::new(self.registry()?),
            self.state_store()?,
            gateway,
        )
        .with_log_capacity(self.config.progress_log_capacity);
        Ok(Arc::new(engine))
    }
}

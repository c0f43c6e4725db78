//! Hearth runtime.
//!
//! Owns the plugin registry, the chosen LLM and embedder, memory and the
//! session store. `bootstrap` wires them together; `handle_message` runs one
//! user turn end to end and always returns a reply.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use hearth_core::{
    Embedder, HearthError, HearthResult, LlmProvider, OutboundSender, SessionStore, WorkingMemory,
};
use hearth_config::{HearthConfig, defaults, resolve_path};
use hearth_hooks::{HookPipeline, HookSlot};
use hearth_logging::{AgentEvent, EventLogger, init_console_logger, init_logger};
use hearth_memory::{MemoryCollections, MemoryRecall, ProcedureIndex, RecallConfig, RecallConfigs};
use hearth_plugins::{
    CommandInstaller, DependencyInstaller, NativeCatalog, PluginLoader, PluginRegistry,
    PluginWatcher, RegistryOptions, RuntimeSnapshot, SnapshotSource, SyncObserver, spawn_watcher,
};

use crate::orchestrator::{AgentConfig, AgentOrchestrator};
use crate::output::AgentOutput;
use crate::prompts::APOLOGY;

pub struct HearthOptions {
    pub plugins: RegistryOptions,
    /// Watch the plugins root and hot-reload on changes.
    pub watch: bool,
    pub catalog: NativeCatalog,
    pub dependency_installer: Option<Arc<dyn DependencyInstaller>>,
    pub agent: AgentConfig,
    pub recall: RecallConfigs,
}

impl HearthOptions {
    pub fn new(plugins: RegistryOptions) -> Self {
        Self {
            plugins,
            watch: false,
            catalog: NativeCatalog::new(),
            dependency_installer: None,
            agent: AgentConfig::default(),
            recall: RecallConfigs::default(),
        }
    }

    /// Options from a prepared config. Relative paths are resolved against
    /// `base`, normally the config directory.
    pub fn from_config(config: &HearthConfig, base: &Path) -> Self {
        let plugins = config.plugins.clone().unwrap_or_default();
        let root = resolve_path(
            base,
            plugins.root.as_deref().unwrap_or(defaults::DEFAULT_PLUGINS_ROOT),
        );
        let active_set = resolve_path(
            base,
            plugins.active_set_file.as_deref().unwrap_or(defaults::DEFAULT_ACTIVE_SET_FILE),
        );

        let mut options = Self::new(RegistryOptions { root, active_set_path: Some(active_set) });
        options.watch = plugins.watch.unwrap_or(false);

        if let Some(deps) = plugins.dependencies.filter(|d| d.enabled == Some(true)) {
            let file = deps.file.as_deref().unwrap_or(defaults::DEFAULT_DEPENDENCY_FILE);
            let command = deps.command.as_deref().unwrap_or(defaults::DEFAULT_DEPENDENCY_COMMAND);
            options.dependency_installer = Some(Arc::new(CommandInstaller::new(file, command)));
        }

        if let Some(agent) = &config.agent {
            let stock = AgentConfig::default();
            options.agent = AgentConfig {
                instant_tool_trigger: agent
                    .instant_tool_trigger
                    .unwrap_or(stock.instant_tool_trigger),
                max_iterations: agent.max_iterations.unwrap_or(stock.max_iterations),
                fallback_history_turns: agent
                    .fallback_history_turns
                    .unwrap_or(stock.fallback_history_turns),
                selection_history_turns: agent
                    .selection_history_turns
                    .unwrap_or(stock.selection_history_turns),
            };
        }

        if let Some(memory) = &config.memory {
            let recall = &mut options.recall;
            for (target, source) in [
                (&mut recall.episodic, &memory.episodic),
                (&mut recall.declarative, &memory.declarative),
                (&mut recall.procedural, &memory.procedural),
            ] {
                if let Some(source) = source {
                    *target = RecallConfig::new(
                        source.k.unwrap_or(target.k),
                        source.threshold.unwrap_or(target.threshold),
                    );
                }
            }
        }
        options
    }
}

/// Install the global subscriber from the `logging` section: console only, or
/// console plus a rolling JSON file in the log directory.
pub fn init_logging(config: &HearthConfig, base: &Path) {
    let logging = config.logging.clone().unwrap_or_default();
    let level = logging.level.as_deref().unwrap_or(defaults::DEFAULT_LOG_LEVEL);
    if logging.json.unwrap_or(false) {
        let dir = resolve_path(base, logging.dir.as_deref().unwrap_or(defaults::DEFAULT_LOG_DIR));
        init_logger(dir, level);
    } else {
        init_console_logger(level);
    }
}

/// A user message as it flows through `before_read_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub user_id: String,
    pub text: String,
}

/// Pick the first capability, in the order the hook chain returned, whose
/// name is in `allowed`.
fn choose<T: ?Sized>(
    candidates: &[Arc<T>],
    allowed: &[String],
    name: impl Fn(&T) -> &str,
) -> Option<Arc<T>> {
    allowed
        .iter()
        .find_map(|wanted| candidates.iter().find(|c| name(&***c) == wanted.as_str()))
        .cloned()
}

pub struct Hearth {
    registry: Arc<PluginRegistry>,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    recall: MemoryRecall,
    orchestrator: AgentOrchestrator,
    sessions: SessionStore,
    watcher: Option<PluginWatcher>,
}

impl Hearth {
    /// Discover plugins, run the bootstrap hooks, choose the LLM and embedder
    /// among `llms` and `embedders`, index procedures and start watching.
    ///
    /// Fails only when no allowed LLM or embedder is left.
    pub async fn bootstrap(
        options: HearthOptions,
        llms: Vec<Arc<dyn LlmProvider>>,
        embedders: Vec<Arc<dyn Embedder>>,
    ) -> HearthResult<Self> {
        let mut loader = PluginLoader::new(options.catalog);
        if let Some(installer) = options.dependency_installer {
            loader = loader.with_dependency_installer(installer);
        }
        let registry = Arc::new(PluginRegistry::new(options.plugins, loader));
        registry.find_plugins().await;

        let hooks = registry.snapshot().hooks.clone();
        let llm_names: Vec<String> = llms.iter().map(|l| l.name().to_string()).collect();
        let embedder_names: Vec<String> = embedders.iter().map(|e| e.name().to_string()).collect();
        let info = json!({
            "plugins_root": registry.root().display().to_string(),
            "llms": llm_names,
            "embedders": embedder_names,
        });
        hooks.execute(HookSlot::BeforeBootstrap, info.clone(), None).await?;

        let allowed_llms: Vec<String> =
            hooks.execute_as(HookSlot::AllowedLlms, llm_names, None).await?;
        let llm = choose(&llms, &allowed_llms, |l| l.name())
            .ok_or_else(|| HearthError::Config("no allowed LLM provider available".into()))?;
        let allowed_embedders: Vec<String> = hooks
            .execute_as(HookSlot::AllowedEmbedders, embedder_names, None)
            .await?;
        let embedder = choose(&embedders, &allowed_embedders, |e| e.name())
            .ok_or_else(|| HearthError::Config("no allowed embedder available".into()))?;
        info!(llm = %llm.name(), embedder = %embedder.name(), "[Hearth] capabilities selected");

        let collections = MemoryCollections::in_memory();
        hooks
            .execute(HookSlot::MemoryCollections, collections.describe().await, None)
            .await?;

        let index = Arc::new(ProcedureIndex::new(embedder.clone(), collections.procedural.clone()));
        registry.add_observer(index.clone());
        if let Err(e) = index.on_synchronize(registry.snapshot()).await {
            warn!("[Hearth] initial procedure indexing failed: {e:#}");
        }

        let watcher = if options.watch {
            match spawn_watcher(registry.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("[Hearth] plugin watcher unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let hearth = Self {
            recall: MemoryRecall::new(embedder.clone(), collections, options.recall),
            orchestrator: AgentOrchestrator::new(options.agent),
            sessions: SessionStore::new(),
            registry,
            llm,
            embedder,
            watcher,
        };
        hooks.execute(HookSlot::AfterBootstrap, info, None).await?;
        info!("[Hearth] bootstrap complete");
        Ok(hearth)
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn memory(&self) -> &MemoryRecall {
        &self.recall
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer one message. Turns of the same user run one at a time; the turn
    /// keeps the snapshot it started with even if plugins change meanwhile.
    pub async fn handle_message(
        &self,
        user_id: &str,
        text: &str,
        outbound: Option<OutboundSender>,
    ) -> AgentOutput {
        let session = self.sessions.get_or_create(user_id).await;
        let mut wm = session.lock().await;
        wm.set_outbound(outbound);

        let snapshot = self.registry.snapshot();
        let reply = match self.turn(&snapshot, &mut wm, user_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(user = %user_id, "[Hearth] turn failed: {e}");
                EventLogger::log_event(user_id, AgentEvent::Error { error_msg: e.to_string() });
                AgentOutput::text(APOLOGY)
            }
        };
        wm.set_outbound(None);
        reply
    }

    async fn turn(
        &self,
        snapshot: &RuntimeSnapshot,
        wm: &mut WorkingMemory,
        user_id: &str,
        text: &str,
    ) -> HearthResult<AgentOutput> {
        let hooks: &HookPipeline = &snapshot.hooks;
        let message = UserMessage { user_id: user_id.to_string(), text: text.to_string() };
        let message: UserMessage = hooks
            .execute_as(HookSlot::BeforeReadMessage, message, Some(&mut *wm))
            .await?;
        wm.user_message = Some(message.text.clone());
        EventLogger::log_event(
            user_id,
            AgentEvent::Message { role: "human".into(), content: message.text.clone() },
        );

        if let Err(e) = self.recall.recall(hooks, wm).await {
            warn!(user = %user_id, "[Hearth] recall failed, answering without memories: {e}");
        }

        let reply = self.orchestrator.run_turn(snapshot, self.llm.as_ref(), wm).await;
        let reply: AgentOutput = hooks
            .execute_as(HookSlot::BeforeSendMessage, reply, Some(&mut *wm))
            .await?;

        if let Err(e) = self.recall.store_episodic(hooks, wm, &message.text).await {
            warn!(user = %user_id, "[Hearth] episodic memory not stored: {e}");
        }
        wm.push_human(message.text);
        wm.push_ai(reply.output.clone());
        EventLogger::log_event(
            user_id,
            AgentEvent::Message { role: "ai".into(), content: reply.output.clone() },
        );
        Ok(reply)
    }

    /// Forget everything about `user_id`.
    pub async fn clear_session(&self, user_id: &str) -> bool {
        self.sessions.remove(user_id).await
    }

    /// Stop watching the plugins root.
    pub fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
            info!("[Hearth] plugin watcher stopped");
        }
    }
}

/// Serializable view of the current state, for status endpoints.
pub async fn status(hearth: &Hearth) -> Value {
    let snapshot = hearth.registry.snapshot();
    json!({
        "generation": snapshot.generation,
        "llm": hearth.llm.name(),
        "embedder": hearth.embedder.name(),
        "procedures": snapshot.procedures.names(),
        "plugins": hearth.registry.summaries().await,
        "memory": hearth.recall.collections().describe().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{KeywordEmbedder, ScriptedLlm};

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn embedders() -> Vec<Arc<dyn Embedder>> {
        vec![Arc::new(KeywordEmbedder) as Arc<dyn Embedder>]
    }

    fn options(root: &tempfile::TempDir) -> HearthOptions {
        HearthOptions::new(RegistryOptions {
            root: root.path().join("plugins"),
            active_set_path: Some(root.path().join("active_plugins.json")),
        })
    }

    #[tokio::test]
    async fn base_only_bootstrap_answers_through_the_llm() {
        let root = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("Hi Alice!".into())]));
        let llms = vec![llm.clone() as Arc<dyn LlmProvider>];
        let hearth = Hearth::bootstrap(options(&root), llms, embedders()).await.unwrap();

        let reply = hearth.handle_message("alice", "hello", None).await;
        assert_eq!(reply.output, "Hi Alice!");

        let session = hearth.sessions().get("alice").await.unwrap();
        let wm = session.lock().await;
        assert_eq!(wm.history.len(), 2);
        assert_eq!(wm.history[1].text, "Hi Alice!");
    }

    #[tokio::test]
    async fn capability_filtering_follows_hooks() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join("plugins/picky"),
            "main.yaml",
            "hooks:\n  - slot: allowed_llms\n    priority: 1\n    remove: [\"first\"]\n",
        );
        std::fs::write(root.path().join("active_plugins.json"), r#"["core_plugin", "picky"]"#)
            .unwrap();

        struct Named(&'static str);
        #[async_trait::async_trait]
        impl LlmProvider for Named {
            fn name(&self) -> &str {
                self.0
            }
            async fn complete(
                &self,
                _r: &hearth_core::LlmRequest,
            ) -> anyhow::Result<hearth_core::LlmResponse> {
                Ok(hearth_core::LlmResponse { content: self.0.into(), ..Default::default() })
            }
        }

        let hearth = Hearth::bootstrap(
            options(&root),
            vec![Arc::new(Named("first")) as Arc<dyn LlmProvider>, Arc::new(Named("second"))],
            embedders(),
        )
        .await
        .unwrap();
        assert_eq!(hearth.llm().name(), "second");
    }

    #[tokio::test]
    async fn no_allowed_embedder_aborts_bootstrap() {
        let root = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let err = Hearth::bootstrap(options(&root), vec![llm as Arc<dyn LlmProvider>], vec![])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HearthError::Config(_)));
    }

    #[tokio::test]
    async fn recalled_procedure_is_selected_and_run() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join("plugins/clock"),
            "main.yaml",
            "tools:\n  - name: get_time\n    description: tells the time\
             \n    examples: [\"what time is it\"]\n    reply: \"It is noon\"\n    direct: true\n",
        );
        std::fs::write(root.path().join("active_plugins.json"), r#"["core_plugin", "clock"]"#)
            .unwrap();

        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            r#"{"action": "get_time", "action_input": null}"#.into(),
        )]));
        let llms = vec![llm.clone() as Arc<dyn LlmProvider>];
        let hearth = Hearth::bootstrap(options(&root), llms, embedders()).await.unwrap();

        let reply = hearth.handle_message("alice", "what time is it?", None).await;
        assert_eq!(reply.output, "It is noon");
        assert!(reply.return_direct);
        assert_eq!(llm.calls(), 1);

        // the message was stored in episodic memory
        assert_eq!(hearth.memory().collections().episodic.len().await, 1);
    }

    #[tokio::test]
    async fn toggling_a_plugin_reindexes_procedures() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join("plugins/clock"),
            "main.yaml",
            "tools:\n  - name: get_time\n    examples: [\"what time is it\"]\n    reply: noon\n",
        );
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let hearth =
            Hearth::bootstrap(options(&root), vec![llm as Arc<dyn LlmProvider>], embedders())
                .await
                .unwrap();
        let procedural = hearth.memory().collections().procedural.clone();
        assert_eq!(procedural.len().await, 0);

        hearth.registry().toggle_plugin("clock").await.unwrap();
        assert_eq!(procedural.len().await, 1);

        let status = status(&hearth).await;
        assert_eq!(status["procedures"], json!(["get_time"]));
    }

    #[test]
    fn options_follow_the_config() {
        let yaml = "plugins:\n  root: extensions\n  watch: true\
                    \n  dependencies:\n    enabled: true\
                    \nagent:\n  maxIterations: 2\
                    \nmemory:\n  procedural:\n    k: 6\n";
        let config = hearth_config::apply_all_defaults(serde_yaml::from_str(yaml).unwrap());
        let options = HearthOptions::from_config(&config, Path::new("/etc/hearth"));

        assert_eq!(options.plugins.root, Path::new("/etc/hearth/extensions"));
        assert_eq!(
            options.plugins.active_set_path.as_deref(),
            Some(Path::new("/etc/hearth/active_plugins.json"))
        );
        assert!(options.watch);
        assert_eq!(
            options.dependency_installer.as_ref().map(|i| i.file_name().to_string()),
            Some("requirements.txt".into())
        );
        assert_eq!(options.agent.max_iterations, 2);
        assert_eq!(options.agent.fallback_history_turns, 5);
        assert_eq!(options.recall.procedural, RecallConfig::new(6, 0.7));
        assert_eq!(options.recall.episodic, RecallConfig::new(3, 0.7));
    }

    #[test]
    fn default_config_keeps_dependencies_off() {
        let config = hearth_config::apply_all_defaults(HearthConfig::default());
        let options = HearthOptions::from_config(&config, Path::new("/tmp/h"));
        assert!(options.dependency_installer.is_none());
        assert!(!options.watch);
        assert_eq!(options.plugins.root, Path::new("/tmp/h/plugins"));
    }

    #[test]
    fn choose_respects_hook_order() {
        let items: Vec<Arc<str>> = vec![Arc::from("a"), Arc::from("b")];
        let picked = choose(&items, &["b".to_string(), "a".to_string()], |s| s).unwrap();
        assert_eq!(&*picked, "b");
        assert!(choose(&items, &["z".to_string()], |s| s).is_none());
    }
}

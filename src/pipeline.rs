//! Build pipeline orchestration
//!
//! Stages run in order, each completing before the next: resolve
//! configurations, install compilers, repositories and plugins, compile,
//! then optional post steps. Only the compile stage fans out; it is bounded
//! by a semaphore and cancelled wholesale on the first failure.

use crate::actions;
use crate::compile::{CompilerBuilder, Invocation};
use crate::config::{ConfigItem, ConfigResolver};
use crate::error::{ProtopinError, ProtopinResult};
use crate::exec::{CommandRequest, Executor, SystemExecutor};
use crate::install::Installer;
use crate::store::ArtifactStore;
use crate::ui::StepProgress;
use crate::versions::{is_symbolic, split_binding, VersionResolver};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default width of the compile worker pool
pub const DEFAULT_COMPILE_JOBS: usize = 10;

/// Explicit execution options, passed down the call chain
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum concurrent compiler invocations
    pub jobs: usize,
    /// Whether post actions and the post shell run after a successful compile
    pub run_post_steps: bool,
    /// Log external commands instead of executing them
    pub dry_run: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_COMPILE_JOBS,
            run_post_steps: false,
            dry_run: false,
        }
    }
}

/// Drives the full build pipeline
pub struct Pipeline {
    resolver: ConfigResolver,
    versions: Arc<VersionResolver>,
    installer: Arc<Installer>,
    builder: CompilerBuilder,
    executor: Arc<dyn Executor>,
    options: BuildOptions,
}

impl Pipeline {
    /// Create a pipeline running real processes against `store`
    pub fn new(store: ArtifactStore, options: BuildOptions) -> Self {
        let executor: Arc<dyn Executor> = if options.dry_run {
            Arc::new(SystemExecutor::dry_run())
        } else {
            Arc::new(SystemExecutor::new())
        };
        Self::with_executor(store, executor, options)
    }

    /// Create a pipeline with an injected executor (used by tests)
    pub fn with_executor(
        store: ArtifactStore,
        executor: Arc<dyn Executor>,
        options: BuildOptions,
    ) -> Self {
        let versions = Arc::new(VersionResolver::new(Arc::clone(&executor)));
        let installer = Arc::new(Installer::new(store.clone(), Arc::clone(&executor)));
        let builder =
            CompilerBuilder::new(store.clone(), Arc::clone(&versions), Arc::clone(&installer));
        Self {
            resolver: ConfigResolver::new(&store),
            versions,
            installer,
            builder,
            executor,
            options,
        }
    }

    /// Run every stage over `targets`
    pub async fn run(&self, targets: &[PathBuf]) -> ProtopinResult<()> {
        let items = self.resolve_configs(targets)?;
        self.install(&items).await?;
        self.compile(targets).await?;
        self.post_steps(&items).await
    }

    /// Resolve the governing configuration of every target, deduplicated by
    /// document identity in first-use order
    pub fn resolve_configs(&self, targets: &[PathBuf]) -> ProtopinResult<Vec<ConfigItem>> {
        let progress = StepProgress::start("Resolve configurations", targets.len());
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for target in targets {
            let item = match self.resolver.resolve(target) {
                Ok(item) => item,
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            };
            progress.note(&item.id());
            if seen.insert(item.id()) {
                items.push(item);
            }
            progress.inc();
        }
        progress.finish();
        Ok(items)
    }

    /// Install everything the configurations need
    pub async fn install(&self, items: &[ConfigItem]) -> ProtopinResult<()> {
        self.install_compilers(items).await?;
        self.install_repositories(items).await?;
        self.install_plugins(items).await
    }

    async fn install_compilers(&self, items: &[ConfigItem]) -> ProtopinResult<()> {
        let mut specs = Vec::new();
        let mut seen = HashSet::new();
        for item in items {
            let version = &item.config().protoc;
            if version.is_empty() {
                return Err(ProtopinError::MissingCompilerVersion(
                    item.path().to_path_buf(),
                ));
            }
            if seen.insert(version.clone()) {
                specs.push(version.clone());
            }
        }

        let progress = StepProgress::start("Install protoc", specs.len());
        for spec in specs {
            let result = async {
                let version = if is_symbolic(&spec) {
                    progress.note("query latest protoc version");
                    self.versions.latest_compiler_version().await?
                } else {
                    spec.clone()
                };
                progress.note(&format!("protoc {version}"));
                self.installer.ensure_compiler(&version).await
            }
            .await;
            if let Err(e) = result {
                progress.abandon();
                return Err(e);
            }
            progress.inc();
        }
        progress.finish();
        Ok(())
    }

    async fn install_repositories(&self, items: &[ConfigItem]) -> ProtopinResult<()> {
        let bindings = unique_bindings(items, |config| &config.repositories);
        if bindings.is_empty() {
            return Ok(());
        }
        let progress = StepProgress::start("Install repositories", bindings.len());
        for binding in bindings {
            let result = async {
                let (uri, version) = split_binding(&binding)?;
                let commit = if is_symbolic(&version) {
                    progress.note(&format!("query HEAD of {uri}"));
                    self.versions.latest_repository_commit(&uri).await?
                } else {
                    version
                };
                progress.note(&format!("{uri}@{commit}"));
                self.installer.ensure_repository(&uri, &commit).await
            }
            .await;
            if let Err(e) = result {
                progress.abandon();
                return Err(e);
            }
            progress.inc();
        }
        progress.finish();
        Ok(())
    }

    async fn install_plugins(&self, items: &[ConfigItem]) -> ProtopinResult<()> {
        let bindings = unique_bindings(items, |config| &config.plugins);
        if bindings.is_empty() {
            return Ok(());
        }
        let progress = StepProgress::start("Install plugins", bindings.len());
        for binding in bindings {
            let result = async {
                let (package, version) = split_binding(&binding)?;
                let version = if is_symbolic(&version) {
                    progress.note(&format!("query latest version of {package}"));
                    self.versions.latest_plugin_version(&package).await?
                } else {
                    version
                };
                progress.note(&format!("{package}@{version}"));
                self.installer.ensure_plugin(&package, &version).await
            }
            .await;
            if let Err(e) = result {
                progress.abandon();
                return Err(e);
            }
            progress.inc();
        }
        progress.finish();
        Ok(())
    }

    /// Compile every target with bounded concurrency.
    ///
    /// One invocation is synthesized per distinct configuration, then
    /// targets fan out into a worker pool of `options.jobs`. The first
    /// failure aborts all in-flight and queued work and is the error
    /// returned; results are not ordered.
    pub async fn compile(&self, targets: &[PathBuf]) -> ProtopinResult<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let progress = Arc::new(StepProgress::start("Compile proto files", targets.len()));

        let mut invocations: HashMap<String, Arc<Invocation>> = HashMap::new();
        let mut plan = Vec::with_capacity(targets.len());
        for target in targets {
            let item = self.resolver.resolve(target)?;
            let invocation = match invocations.get(&item.id()) {
                Some(hit) => Arc::clone(hit),
                None => {
                    let built = Arc::new(self.builder.build(&item).await?);
                    debug!(config = %item.id(), args = built.args.len(), "synthesized invocation");
                    invocations.insert(item.id(), Arc::clone(&built));
                    built
                }
            };
            plan.push((target.clone(), invocation));
        }

        let semaphore = Arc::new(Semaphore::new(self.options.jobs.max(1)));
        let mut tasks = JoinSet::new();
        for (target, invocation) in plan {
            let semaphore = Arc::clone(&semaphore);
            let executor = Arc::clone(&self.executor);
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ProtopinError::Internal(e.to_string()))?;
                progress.note(&target.display().to_string());
                let request =
                    CommandRequest::new(invocation.program.display().to_string(), invocation.args_for(&target))
                        .dir(invocation.work_dir.clone());
                executor.execute(request).await?;
                progress.inc();
                Ok::<(), ProtopinError>(())
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                        // first-error-wins: stop starting work, kill in-flight
                        tasks.abort_all();
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(ProtopinError::Internal(e.to_string()));
                        tasks.abort_all();
                    }
                }
            }
        }
        match first_error {
            Some(e) => {
                progress.abandon();
                Err(e)
            }
            None => {
                progress.finish();
                Ok(())
            }
        }
    }

    async fn post_steps(&self, items: &[ConfigItem]) -> ProtopinResult<()> {
        if !self.options.run_post_steps {
            if items.iter().any(|item| item.config().has_post_steps()) {
                warn!("post actions and post shell skipped; pass --post-scripts to enable them");
            }
            return Ok(());
        }
        for item in items {
            actions::execute_post_actions(item, self.options.dry_run)?;
            actions::execute_post_shell(item, self.executor.as_ref()).await?;
        }
        Ok(())
    }
}

/// Binding strings of every item, deduplicated in first-use order
fn unique_bindings<'a, F>(items: &'a [ConfigItem], select: F) -> Vec<String>
where
    F: Fn(&'a crate::config::Config) -> &'a std::collections::BTreeMap<String, String>,
{
    let mut seen = HashSet::new();
    let mut bindings = Vec::new();
    for item in items {
        for binding in select(item.config()).values() {
            if seen.insert(binding.clone()) {
                bindings.push(binding.clone());
            }
        }
    }
    bindings
}

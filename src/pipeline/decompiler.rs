//! Per-method orchestration and batch scheduling.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, trace_span, warn};

use crate::{
    analysis::{CfgBuilder, RegisterLiveness, SsaBuilder, TypeInference},
    bytecode::{ClassCode, MethodCode, MethodKey},
    codegen::{listing, ExpressionAssembler, JavaWriter, MethodBody},
    config::DecompilerConfig,
    pipeline::{DiagnosticsSink, MethodCache, MethodRecord, MethodStatus},
    structure::{Structure, Structurer},
    types::{ClassHierarchy, TypeRef},
    utils::CancellationToken,
    Error, ErrorKind, Result,
};

/// What a method run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Decompiled source
    Source {
        /// Statement tree handed to the writer
        body: MethodBody,
        /// Rendered method declaration
        text: String,
    },
    /// Raw instruction listing, for methods that could not be decompiled
    Listing(String),
}

impl Artifact {
    /// Returns the printable text of the artifact.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Artifact::Source { text, .. } | Artifact::Listing(text) => text,
        }
    }
}

/// Result of decompiling one method. Produced for every method, whatever went wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutcome {
    /// The method
    pub key: MethodKey,
    /// How far the pipeline got
    pub status: MethodStatus,
    /// Best available rendering
    pub artifact: Artifact,
    /// Non-fatal problems met on the way
    pub warnings: Vec<String>,
}

impl MethodOutcome {
    /// Returns the rendered source, if any was produced.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        match &self.artifact {
            Artifact::Source { text, .. } => Some(text),
            Artifact::Listing(_) => None,
        }
    }
}

/// Outcomes of all methods of one class, in declaration order.
#[derive(Debug, Clone)]
pub struct ClassOutcome {
    /// Class name
    pub name: TypeRef,
    /// One outcome per method
    pub methods: Vec<Arc<MethodOutcome>>,
}

impl ClassOutcome {
    /// Renders the class with its methods; listings are kept as comments.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("class {} {{\n", self.name.simple_name());
        for (position, outcome) in self.methods.iter().enumerate() {
            if position > 0 {
                out.push('\n');
            }
            for line in outcome.artifact.text().lines() {
                let line = match (&outcome.artifact, line.starts_with("//")) {
                    (Artifact::Listing(_), false) => format!("// {line}"),
                    _ => line.to_string(),
                };
                out.push_str("    ");
                out.push_str(&line);
                out.push('\n');
            }
        }
        out.push_str("}\n");
        out
    }

    /// Returns `true` if every method produced structured source.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.methods
            .iter()
            .all(|outcome| outcome.status == MethodStatus::Success)
    }
}

/// Drives methods through graph building, structuring, SSA, type inference and assembly.
///
/// A `Decompiler` is shared by all workers of a batch run. Errors never escape a method:
/// [`Decompiler::decompile_method`] always returns an outcome, degrading to an explicit-jump
/// rendering or a raw listing when a stage fails, and records it in the diagnostics sink.
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use dexscope::prelude::*;
///
/// let decompiler = Decompiler::new(DecompilerConfig::default(), Arc::new(ClassHierarchyMap::new()))
///     .with_cache(Arc::new(MemoryCache::new()));
/// for class in decompiler.decompile_classes(&classes)? {
///     println!("{}", class.render());
/// }
/// ```
pub struct Decompiler {
    config: DecompilerConfig,
    hierarchy: Arc<dyn ClassHierarchy>,
    cache: Option<Arc<dyn MethodCache>>,
    diagnostics: Arc<DiagnosticsSink>,
    token: CancellationToken,
    writer: JavaWriter,
}

impl Decompiler {
    /// Creates a decompiler without a cache.
    #[must_use]
    pub fn new(config: DecompilerConfig, hierarchy: Arc<dyn ClassHierarchy>) -> Self {
        Decompiler {
            config,
            hierarchy,
            cache: None,
            diagnostics: Arc::new(DiagnosticsSink::new()),
            token: CancellationToken::new(),
            writer: JavaWriter::new(),
        }
    }

    /// Memoizes outcomes in `cache` (unless [`DecompilerConfig::use_cache`] is off).
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn MethodCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sends method records to `diagnostics` instead of a private sink.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Observes `token` at every cancellation checkpoint.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DecompilerConfig {
        &self.config
    }

    /// Returns the diagnostics sink.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<DiagnosticsSink> {
        &self.diagnostics
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Starts a new run: cached outcomes of earlier runs are dropped.
    pub fn begin_run(&self) {
        if let Some(cache) = &self.cache {
            cache.begin_run();
        }
    }

    fn cache(&self) -> Option<&Arc<dyn MethodCache>> {
        self.cache.as_ref().filter(|_| self.config.use_cache)
    }

    /// Decompiles one method.
    ///
    /// Never fails: problems are reported through [`MethodOutcome::status`] and the
    /// diagnostics sink.
    pub fn decompile_method(&self, method: &MethodCode) -> Arc<MethodOutcome> {
        let key = method.key();
        if let Some(outcome) = self.cache().and_then(|cache| cache.get(&key)) {
            debug!(method = %key, "cache hit");
            self.record(&outcome, true);
            return outcome;
        }

        let outcome = Arc::new(self.run(method, key));
        if outcome.status != MethodStatus::Cancelled {
            if let Some(cache) = self.cache() {
                cache.insert(outcome.key.clone(), outcome.clone());
            }
        }
        self.record(&outcome, false);
        outcome
    }

    /// Decompiles every method of every class on a fixed-size worker pool.
    ///
    /// Output order follows input order regardless of scheduling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadPool`] if the worker pool cannot be created. Method failures
    /// are reported per method, never as an error.
    pub fn decompile_classes(&self, classes: &[ClassCode]) -> Result<Vec<ClassOutcome>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .build()?;
        Ok(pool.install(|| {
            classes
                .par_iter()
                .map(|class| ClassOutcome {
                    name: class.name.clone(),
                    methods: class
                        .methods
                        .par_iter()
                        .map(|method| self.decompile_method(method))
                        .collect(),
                })
                .collect()
        }))
    }

    fn record(&self, outcome: &MethodOutcome, cached: bool) {
        self.diagnostics.record(MethodRecord {
            key: outcome.key.clone(),
            status: outcome.status,
            warnings: outcome.warnings.clone(),
            cached,
        });
    }

    fn run(&self, method: &MethodCode, key: MethodKey) -> MethodOutcome {
        let span = trace_span!("decompile", method = %key);
        let _guard = span.enter();

        let mut warnings = Vec::new();
        match self.analyze(method, &mut warnings) {
            Ok((body, degraded)) => {
                let text = self.writer.method(method, &body);
                let status = match degraded {
                    Some(kind) => {
                        warn!(method = %key, %kind, "method degraded to explicit jumps");
                        MethodStatus::Degraded(kind)
                    }
                    None => MethodStatus::Success,
                };
                MethodOutcome {
                    key,
                    status,
                    artifact: Artifact::Source { body, text },
                    warnings,
                }
            }
            Err(Error::Cancelled) => {
                debug!(method = %key, "cancelled");
                MethodOutcome {
                    key,
                    status: MethodStatus::Cancelled,
                    artifact: Artifact::Listing(listing(method)),
                    warnings,
                }
            }
            Err(error) => {
                warn!(method = %key, %error, "method failed, emitting listing");
                warnings.push(error.to_string());
                MethodOutcome {
                    key,
                    status: MethodStatus::Failed(error.kind()),
                    artifact: Artifact::Listing(listing(method)),
                    warnings,
                }
            }
        }
    }

    /// Runs every stage. Returns the body and, if structuring had to fall back to explicit
    /// jumps, the kind of error that caused it.
    fn analyze(
        &self,
        method: &MethodCode,
        warnings: &mut Vec<String>,
    ) -> Result<(MethodBody, Option<ErrorKind>)> {
        self.token.checkpoint()?;
        let cfg = CfgBuilder::build(method)?;
        let liveness = RegisterLiveness::compute(&cfg, method.registers);

        let mut degraded = None;
        let structure = match Structurer::new(&cfg, method, &liveness)
            .with_config(&self.config)
            .with_cancellation(self.token.clone())
            .structure()
        {
            Ok(structure) => structure,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(error) => {
                warnings.push(error.to_string());
                degraded = Some(error.kind());
                Structure::flat(&cfg)
            }
        };

        let ssa = SsaBuilder::build(&cfg, method, &liveness)?;
        let types = TypeInference::new(&cfg, &ssa, method, self.hierarchy.as_ref())
            .with_max_rounds(self.config.max_type_iterations)
            .with_cancellation(self.token.clone())
            .solve()?;
        warnings.extend(types.warnings().iter().cloned());

        let assemble = |structure: &Structure| {
            ExpressionAssembler::new(&cfg, method, &ssa, &types, structure)
                .with_config(&self.config)
                .assemble()
        };
        match assemble(&structure) {
            Ok(body) => Ok((body, degraded)),
            Err(error) if degraded.is_none() => {
                warnings.push(error.to_string());
                let body = assemble(&Structure::flat(&cfg))?;
                Ok((body, Some(error.kind())))
            }
            Err(error) => Err(error),
        }
    }
}

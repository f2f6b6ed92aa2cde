//! The script engine: all state a running handler can reach.
//!
//! An [`Engine`] is owned by the script worker (see [`super::worker`]); handler
//! code receives `&Engine` and mutates through the interior locks of property
//! stores, globals and flags. Structural changes to the part hierarchy need
//! `&mut Engine` and therefore happen in worker jobs, between dispatches.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::RuntimeConfig;
use super::chunk::{Chunk, ChunkResolver, Granularity, Preposition};
use super::context::ExecutionContext;
use super::error::{ScriptError, ScriptResult};
use super::hierarchy::{PartRegistry, Scope};
use super::ordinal::{OrdinalSource, SeededSource};
use super::part::{PartKey, PartModel};
use super::property::{Adjective, ChangeReceiver, PropertyStore};
use super::specifier::PartSpecifier;
use super::value::Value;
use crate::interpreter::{Script, ScriptCompiler, SexprCompiler};

/// Built-in behaviour run when a command message goes untrapped.
pub type HostCommand =
    Arc<dyn Fn(&Engine, &mut ExecutionContext, &[Value]) -> ScriptResult<()> + Send + Sync>;

/// Owns the part hierarchy and the shared execution state.
pub struct Engine {
    config: RuntimeConfig,
    registry: PartRegistry,
    compiler: Arc<dyn ScriptCompiler>,
    ordinals: Mutex<Box<dyn OrdinalSource>>,
    item_delimiter: Arc<RwLock<char>>,
    globals: RwLock<HashMap<String, Value>>,
    lock_messages: Arc<AtomicBool>,
    peeking: AtomicBool,
    abort: Arc<AtomicBool>,
    commands: RwLock<HashMap<String, HostCommand>>,
}

impl Engine {
    /// Engine with an empty hierarchy (application and message box only).
    pub fn new(config: RuntimeConfig) -> Self {
        let registry = PartRegistry::new();
        let ordinals: Box<dyn OrdinalSource> =
            Box::new(SeededSource::from_seed_option(config.ordinal_seed));
        let engine = Self {
            item_delimiter: Arc::new(RwLock::new(config.item_delimiter)),
            config,
            registry,
            compiler: Arc::new(SexprCompiler),
            ordinals: Mutex::new(ordinals),
            globals: RwLock::new(HashMap::new()),
            lock_messages: Arc::new(AtomicBool::new(false)),
            peeking: AtomicBool::new(false),
            abort: Arc::new(AtomicBool::new(false)),
            commands: RwLock::new(HashMap::new()),
        };
        engine.define_application_properties();
        engine.register_command("beep", |_, ctx, _| {
            tracing::debug!("beep (context {})", ctx.id());
            Ok(())
        });
        engine
    }

    fn define_application_properties(&self) {
        let app = self.registry.application().properties();

        let flag = self.lock_messages.clone();
        let setter_flag = self.lock_messages.clone();
        app.define_computed(
            "lockMessages",
            Arc::new(move |_: &PropertyStore| Ok(Value::Boolean(flag.load(Ordering::SeqCst)))),
            Some(Arc::new(move |_: &PropertyStore, value: Value| {
                let locked = value.as_bool().ok_or_else(|| {
                    ScriptError::semantic(format!("lockMessages expects true or false, got '{}'", value))
                })?;
                setter_flag.store(locked, Ordering::SeqCst);
                Ok(())
            })),
        );

        let delimiter = self.item_delimiter.clone();
        let setter_delimiter = self.item_delimiter.clone();
        app.define_computed(
            "itemDelimiter",
            Arc::new(move |_: &PropertyStore| Ok(Value::Text(delimiter.read().to_string()))),
            Some(Arc::new(move |_: &PropertyStore, value: Value| {
                let text = value.string_value();
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => {
                        *setter_delimiter.write() = ch;
                        Ok(())
                    }
                    _ => Err(ScriptError::semantic(format!(
                        "itemDelimiter must be a single character, got '{}'",
                        text
                    ))),
                }
            })),
        );
    }

    /// Replace the script compiler.
    pub fn with_compiler(mut self, compiler: Arc<dyn ScriptCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Replace the source of `any` picks.
    pub fn with_ordinal_source(self, source: impl OrdinalSource + 'static) -> Self {
        *self.ordinals.lock() = Box::new(source);
        self
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The part hierarchy.
    pub fn registry(&self) -> &PartRegistry {
        &self.registry
    }

    /// The part hierarchy, for structural changes.
    pub fn registry_mut(&mut self) -> &mut PartRegistry {
        &mut self.registry
    }

    /// Part by key.
    pub fn part(&self, key: PartKey) -> ScriptResult<Arc<PartModel>> {
        self.registry.get(key).cloned()
    }

    /// Scope of the current card.
    pub fn current_scope(&self) -> ScriptResult<Scope> {
        self.registry.current_scope()
    }

    /// Fresh context for a new dispatch chain from the current card.
    pub fn new_context(&self) -> ScriptResult<ExecutionContext> {
        Ok(ExecutionContext::new(self.current_scope()?))
    }

    /// Resolve `spec` against `scope`.
    pub fn resolve(&self, scope: &Scope, spec: &PartSpecifier) -> ScriptResult<Arc<PartModel>> {
        let mut source = self.ordinals.lock();
        self.registry.resolve(scope, spec, &mut **source)
    }

    /// Read a property of the part `spec` names.
    pub fn get_property(
        &self,
        scope: &Scope,
        spec: &PartSpecifier,
        name: &str,
        adjective: Option<Adjective>,
    ) -> ScriptResult<Value> {
        self.resolve(scope, spec)?
            .properties()
            .get_with_adjective(name, adjective)
    }

    /// Write a property of the part `spec` names.
    pub fn set_property(
        &self,
        scope: &Scope,
        spec: &PartSpecifier,
        name: &str,
        adjective: Option<Adjective>,
        value: Value,
    ) -> ScriptResult<()> {
        self.resolve(scope, spec)?
            .properties()
            .set_with_adjective(name, adjective, value)
    }

    /// Change notifications of the part `spec` names.
    pub fn subscribe(
        &self,
        scope: &Scope,
        spec: &PartSpecifier,
    ) -> ScriptResult<ChangeReceiver> {
        Ok(self.resolve(scope, spec)?.properties().subscribe())
    }

    /// Current item delimiter.
    pub fn item_delimiter(&self) -> char {
        *self.item_delimiter.read()
    }

    fn with_resolver<T>(&self, f: impl FnOnce(&mut ChunkResolver<'_>) -> T) -> T {
        let delimiter = self.item_delimiter();
        let mut source = self.ordinals.lock();
        let mut resolver = ChunkResolver::new(delimiter, &mut **source);
        f(&mut resolver)
    }

    /// Text of `chunk` within `value`.
    pub fn get_chunk(&self, value: &Value, chunk: &Chunk) -> Value {
        self.with_resolver(|resolver| value.get_chunk(chunk, resolver))
    }

    /// `value` with `replacement` placed relative to `chunk`.
    pub fn set_chunk(
        &self,
        value: &Value,
        preposition: Preposition,
        chunk: &Chunk,
        replacement: &Value,
    ) -> Value {
        self.with_resolver(|resolver| value.set_chunk(preposition, chunk, replacement, resolver))
    }

    /// Number of `granularity` chunks in `value`.
    pub fn count_chunks(&self, value: &Value, granularity: Granularity) -> usize {
        value.count_chunks(granularity, self.item_delimiter())
    }

    /// Compiled script of `part`, compiling and caching it on first use.
    pub fn script_of(&self, part: &PartModel) -> ScriptResult<Arc<Script>> {
        if let Some(compiled) = part.script_slot().read().compiled.clone() {
            return Ok(compiled);
        }
        let text = part.script_slot().read().text.clone();
        let compiled = Arc::new(self.compiler.compile(&text).inspect_err(|err| {
            tracing::warn!("script of {} failed to compile: {}", part.describe(), err);
        })?);
        let mut slot = part.script_slot().write();
        // Keep a newer edit that raced the compile.
        if slot.text == text {
            slot.compiled = Some(compiled.clone());
        }
        Ok(compiled)
    }

    /// Value of a global variable; unset globals are empty.
    pub fn global(&self, name: &str) -> Value {
        self.globals
            .read()
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Assign a global variable.
    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.write().insert(name.to_lowercase(), value);
    }

    /// Register built-in behaviour for an untrapped command.
    pub fn register_command<F>(&self, name: &str, command: F)
    where
        F: Fn(&Engine, &mut ExecutionContext, &[Value]) -> ScriptResult<()> + Send + Sync + 'static,
    {
        self.commands
            .write()
            .insert(name.to_lowercase(), Arc::new(command));
    }

    /// Built-in behaviour for `name`, if any.
    pub fn host_command(&self, name: &str) -> Option<HostCommand> {
        self.commands.read().get(&name.to_lowercase()).cloned()
    }

    /// Whether lockable messages are currently suppressed.
    pub fn lock_messages(&self) -> bool {
        self.lock_messages.load(Ordering::SeqCst)
    }

    /// Suppress or release lockable messages.
    pub fn set_lock_messages(&self, locked: bool) {
        self.lock_messages.store(locked, Ordering::SeqCst);
    }

    /// Whether every message is suppressed for inspection.
    pub fn is_peeking(&self) -> bool {
        self.peeking.load(Ordering::SeqCst)
    }

    /// Enter or leave peek mode.
    pub fn set_peeking(&self, peeking: bool) {
        self.peeking.store(peeking, Ordering::SeqCst);
    }

    /// Flag shared with callers outside the worker; setting it stops running loops.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Ask running scripts to stop at the next loop iteration.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Whether an abort is pending.
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_abort(&self) {
        self.abort.store(false, Ordering::SeqCst);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("item_delimiter", &self.item_delimiter())
            .field("lock_messages", &self.lock_messages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ordinal::{FixedSource, Ordinal};
    use crate::runtime::part::PartType;

    fn engine() -> Engine {
        let mut engine = Engine::new(RuntimeConfig::default()).with_ordinal_source(FixedSource(1));
        engine.registry_mut().add_stack("Home");
        engine
    }

    #[test]
    fn application_properties_follow_engine_state() {
        let engine = engine();
        let scope = engine.current_scope().unwrap();
        let app = PartSpecifier::by_id(PartType::Application, 0);

        engine.set_lock_messages(true);
        assert_eq!(
            engine.get_property(&scope, &app, "lockmessages", None).unwrap(),
            Value::Boolean(true)
        );
        engine
            .set_property(&scope, &app, "lockMessages", None, Value::text("false"))
            .unwrap();
        assert!(!engine.lock_messages());

        engine
            .set_property(&scope, &app, "itemDelimiter", None, Value::text(";"))
            .unwrap();
        assert_eq!(engine.item_delimiter(), ';');
        assert!(
            engine
                .set_property(&scope, &app, "itemDelimiter", None, Value::text(";;"))
                .is_err()
        );
        assert!(
            engine
                .set_property(&scope, &app, "version", None, Value::text("9"))
                .is_err()
        );
    }

    #[test]
    fn chunks_use_the_current_delimiter_and_source() {
        let engine = engine();
        let list = Value::text("a;b;c");
        let second = Chunk::nth(Granularity::Item, 2).unwrap();
        assert_eq!(engine.get_chunk(&list, &second), Value::text("a;b;c"));
        engine
            .registry()
            .application()
            .properties()
            .set("itemDelimiter", ";")
            .unwrap();
        assert_eq!(engine.get_chunk(&list, &second), Value::text("b"));
        let any = Chunk::new(Granularity::Item, Ordinal::Any);
        assert_eq!(engine.get_chunk(&list, &any), Value::text("b"));
        assert_eq!(engine.count_chunks(&list, Granularity::Item), 3);
    }

    #[test]
    fn scripts_compile_once_until_edited() {
        let engine = engine();
        let card = engine
            .resolve(&engine.current_scope().unwrap(), &PartSpecifier::This(PartType::Card))
            .unwrap();
        card.set_script("(on openCard ())");
        let first = engine.script_of(&card).unwrap();
        let again = engine.script_of(&card).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        card.properties().set("script", "(on closeCard ())").unwrap();
        let edited = engine.script_of(&card).unwrap();
        assert!(edited.handler("closecard").is_some());

        card.set_script("(on broken");
        assert!(matches!(
            engine.script_of(&card),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn globals_are_case_insensitive() {
        let engine = engine();
        engine.set_global("Total", Value::Integer(3));
        assert_eq!(engine.global("TOTAL"), Value::Integer(3));
        assert_eq!(engine.global("missing"), Value::Empty);
    }
}

//! Message dispatch along the part hierarchy.
//!
//! A message starts at its target and climbs the recipient chain (button or
//! field, card, background, stack, application) until a handler traps it.
//! `pass` continues the climb from the next recipient; everything else stops
//! it. Functions walk the same chain looking for a `function` handler.

use std::sync::Arc;

use super::context::{ExecutionContext, StackFrame};
use super::engine::Engine;
use super::error::{ScriptError, ScriptResult};
use super::part::{PartKey, PartModel};
use super::specifier::PartSpecifier;
use super::value::Value;
use crate::interpreter::exec::builtin_function;
use crate::interpreter::{Executor, Flow, Handler};

/// A message travelling up the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Handler name to look for; matched without regard to case.
    pub name: String,
    /// Arguments bound to the handler's parameters.
    pub args: Vec<Value>,
    /// Whether `lockMessages` suppresses it.
    pub lockable: bool,
}

impl Message {
    /// A message sent by script or host; never suppressed by `lockMessages`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            lockable: false,
        }
    }

    /// A system event such as `openCard`; suppressed while messages are locked.
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            lockable: true,
            ..Self::new(name)
        }
    }

    /// Attach arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

/// What happened to a message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOutcome {
    /// The message that was sent.
    pub message: Message,
    /// Whether some handler trapped it.
    pub trapped: bool,
    /// Error raised by the trapping handler.
    pub error: Option<ScriptError>,
}

impl MessageOutcome {
    fn untrapped(message: &Message) -> Self {
        Self {
            message: message.clone(),
            trapped: false,
            error: None,
        }
    }

    fn trapped(message: &Message) -> Self {
        Self {
            message: message.clone(),
            trapped: true,
            error: None,
        }
    }

    fn failed(message: &Message, error: ScriptError) -> Self {
        Self {
            message: message.clone(),
            trapped: true,
            error: Some(error),
        }
    }

    /// Whether the message completed without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Engine {
    fn suppressed(&self, message: &Message) -> bool {
        self.is_peeking() || (message.lockable && self.lock_messages())
    }

    /// Send `message` to the part `target` names, resolved in the context's scope.
    pub fn send_message(
        &self,
        ctx: &mut ExecutionContext,
        target: &PartSpecifier,
        message: &Message,
    ) -> MessageOutcome {
        if self.suppressed(message) {
            tracing::debug!("message {} to {} suppressed", message.name, target);
            return MessageOutcome::untrapped(message);
        }
        match self.resolve(&ctx.scope(), target) {
            Ok(part) => self.deliver(ctx, part.key(), message),
            Err(err) => MessageOutcome {
                message: message.clone(),
                trapped: false,
                error: Some(err),
            },
        }
    }

    /// Send `message` directly to the part `key`.
    pub fn send_to_part(
        &self,
        ctx: &mut ExecutionContext,
        key: PartKey,
        message: &Message,
    ) -> MessageOutcome {
        if self.suppressed(message) {
            tracing::debug!("message {} to {} suppressed", message.name, key);
            return MessageOutcome::untrapped(message);
        }
        self.deliver(ctx, key, message)
    }

    fn deliver(&self, ctx: &mut ExecutionContext, key: PartKey, message: &Message) -> MessageOutcome {
        let top_level = ctx.depth() == 0;
        if let Ok(part) = self.registry().get(key) {
            ctx.set_target(key, part.specifier());
        }
        let outcome = self.walk(ctx, key, message);
        if top_level {
            self.clear_abort();
        }
        outcome
    }

    fn walk(&self, ctx: &mut ExecutionContext, start: PartKey, message: &Message) -> MessageOutcome {
        let mut current = Some(start);
        while let Some(key) = current {
            let part = match self.part(key) {
                Ok(part) => part,
                Err(err) => return MessageOutcome::failed(message, err),
            };
            let handler = match self.script_of(&part) {
                Ok(script) => script.handler(&message.name),
                Err(err) => return MessageOutcome::failed(message, err),
            };
            let Some(handler) = handler else {
                current = self.registry().next_recipient(key);
                continue;
            };
            tracing::debug!(
                "context {}: {} handled by {}",
                ctx.id(),
                message.name,
                part.describe()
            );
            match self.run_handler(ctx, &part, &handler, message.args.clone()) {
                Ok(Flow::Passed) => current = self.registry().next_recipient(key),
                Ok(Flow::Completed | Flow::ExitedHandler) => return MessageOutcome::trapped(message),
                Ok(Flow::Returned(value)) => {
                    ctx.set_result(value);
                    return MessageOutcome::trapped(message);
                }
                Ok(Flow::ExitedRepeat | Flow::NextRepeat) => {
                    return MessageOutcome::failed(
                        message,
                        ScriptError::semantic("repeat control outside a repeat loop"),
                    );
                }
                Err(err) => return MessageOutcome::failed(message, err),
            }
        }
        tracing::trace!("message {} not handled", message.name);
        MessageOutcome::untrapped(message)
    }

    /// Run `handler` from `part`'s script in a fresh frame.
    pub(crate) fn run_handler(
        &self,
        ctx: &mut ExecutionContext,
        part: &Arc<PartModel>,
        handler: &Handler,
        args: Vec<Value>,
    ) -> ScriptResult<Flow> {
        if ctx.depth() >= self.config().max_call_depth {
            let err = ScriptError::semantic("too much recursion");
            return Err(match ctx.location() {
                Some(location) => err.at(location),
                None => err,
            });
        }
        ctx.push_frame(StackFrame::new(
            &handler.name,
            handler.line,
            part.key(),
            part.specifier(),
            part.describe(),
            &handler.params,
            args,
        ));
        let flow = Executor::new(self).run_body(ctx, &handler.body);
        ctx.pop_frame();
        flow
    }

    /// Call function `name`, starting the search at the part `target` names.
    pub fn invoke_function(
        &self,
        ctx: &mut ExecutionContext,
        target: &PartSpecifier,
        name: &str,
        args: Vec<Value>,
    ) -> ScriptResult<Value> {
        let part = self.resolve(&ctx.scope(), target)?;
        let top_level = ctx.depth() == 0;
        if top_level {
            ctx.set_target(part.key(), part.specifier());
        }
        let value = self.call_function_from(ctx, part.key(), name, args);
        if top_level {
            self.clear_abort();
        }
        value
    }

    /// Call function `name`, walking the hierarchy from `start`.
    ///
    /// Built-in functions answer only when no script defines the name.
    pub fn call_function_from(
        &self,
        ctx: &mut ExecutionContext,
        start: PartKey,
        name: &str,
        args: Vec<Value>,
    ) -> ScriptResult<Value> {
        let mut current = Some(start);
        while let Some(key) = current {
            let part = self.part(key)?;
            let Some(function) = self.script_of(&part)?.function(name) else {
                current = self.registry().next_recipient(key);
                continue;
            };
            match self.run_handler(ctx, &part, &function, args.clone())? {
                Flow::Returned(value) => return Ok(value),
                Flow::Completed | Flow::ExitedHandler => return Ok(Value::Empty),
                Flow::Passed => current = self.registry().next_recipient(key),
                Flow::ExitedRepeat | Flow::NextRepeat => {
                    return Err(ScriptError::semantic("repeat control outside a repeat loop"));
                }
            }
        }
        builtin_function(name, &args).unwrap_or_else(|| Err(ScriptError::FunctionNotFound(name.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeConfig;
    use crate::runtime::part::PartType;

    struct Fixture {
        engine: Engine,
        card: PartKey,
        button: PartKey,
        stack: PartKey,
    }

    fn fixture() -> Fixture {
        let mut engine = Engine::new(RuntimeConfig::default());
        let stack = engine.registry_mut().add_stack("Home");
        let card = engine.registry().cards(stack).unwrap()[0];
        let button = engine
            .registry_mut()
            .add_part(card, PartType::Button, "OK")
            .unwrap();
        Fixture {
            engine,
            card,
            button,
            stack,
        }
    }

    fn script(engine: &Engine, key: PartKey, text: &str) {
        engine.part(key).unwrap().set_script(text);
    }

    #[test]
    fn first_handler_on_the_chain_traps() {
        let f = fixture();
        script(&f.engine, f.card, "(on mouseUp () (put \"card\" into msg))");
        script(&f.engine, f.stack, "(on mouseUp () (put \"stack\" into msg))");
        let mut ctx = f.engine.new_context().unwrap();
        let outcome = f.engine.send_to_part(&mut ctx, f.button, &Message::new("mouseup"));
        assert!(outcome.trapped && outcome.is_ok());
        let msg = f.engine.registry().message_box().properties().get("contents").unwrap();
        assert_eq!(msg, Value::text("card"));
        assert_eq!(ctx.target_key(), Some(f.button));
    }

    #[test]
    fn pass_continues_with_the_next_recipient() {
        let f = fixture();
        script(&f.engine, f.button, "(on mouseUp () (put \"a\" into msg) (pass))");
        script(&f.engine, f.stack, "(on mouseUp () (put \"b\" after msg))");
        let mut ctx = f.engine.new_context().unwrap();
        let outcome = f.engine.send_to_part(&mut ctx, f.button, &Message::new("mouseUp"));
        assert!(outcome.trapped);
        let msg = f.engine.registry().message_box().properties().get("contents").unwrap();
        assert_eq!(msg.string_value(), "ab");
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn passing_past_the_application_leaves_the_message_untrapped() {
        let f = fixture();
        script(&f.engine, f.card, "(on idle () (pass))");
        let mut ctx = f.engine.new_context().unwrap();
        let outcome = f.engine.send_to_part(&mut ctx, f.button, &Message::new("idle"));
        assert!(!outcome.trapped);
        assert!(outcome.is_ok());
    }

    #[test]
    fn locked_messages_skip_system_events_only() {
        let f = fixture();
        script(&f.engine, f.card, "(on openCard () (put \"opened\" into msg))");
        f.engine.set_lock_messages(true);
        let mut ctx = f.engine.new_context().unwrap();
        let spec = PartSpecifier::This(PartType::Card);
        let outcome = f.engine.send_message(&mut ctx, &spec, &Message::system("openCard"));
        assert!(!outcome.trapped);
        let outcome = f.engine.send_message(&mut ctx, &spec, &Message::new("openCard"));
        assert!(outcome.trapped);
    }

    #[test]
    fn runaway_recursion_is_reported() {
        let f = fixture();
        script(&f.engine, f.card, "(on loop () (send loop))");
        let mut ctx = f.engine.new_context().unwrap();
        let outcome = f.engine.send_to_part(&mut ctx, f.card, &Message::new("loop"));
        let err = outcome.error.expect("recursion error");
        assert_eq!(err.root(), &ScriptError::semantic("too much recursion"));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn functions_walk_the_chain_and_fall_back_to_builtins() {
        let f = fixture();
        script(&f.engine, f.stack, "(function double (x) (return (* x 2)))");
        let mut ctx = f.engine.new_context().unwrap();
        let doubled = f
            .engine
            .call_function_from(&mut ctx, f.button, "Double", vec![Value::Integer(21)])
            .unwrap();
        assert_eq!(doubled, Value::Integer(42));
        let length = f
            .engine
            .call_function_from(&mut ctx, f.button, "length", vec![Value::text("four")])
            .unwrap();
        assert_eq!(length, Value::Integer(4));
        assert_eq!(
            f.engine.call_function_from(&mut ctx, f.button, "missing", vec![]),
            Err(ScriptError::FunctionNotFound("missing".into()))
        );
    }
}

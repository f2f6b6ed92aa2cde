//! Per-dispatch execution state.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::error::SourceLocation;
use super::hierarchy::Scope;
use super::part::PartKey;
use super::specifier::PartSpecifier;
use super::value::Value;

/// One active handler.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Handler or function name as written.
    pub handler: String,
    /// Line currently executing.
    pub line: usize,
    /// Part whose script holds the handler.
    pub me: PartKey,
    /// Specifier for `me`.
    pub me_spec: PartSpecifier,
    /// Display name of `me`, used in error locations.
    pub me_label: String,
    /// Arguments as passed.
    pub args: Vec<Value>,
    locals: HashMap<String, Value>,
    globals: HashSet<String>,
}

impl StackFrame {
    /// Frame binding `params` to `args`; missing arguments bind to empty.
    pub fn new(
        handler: impl Into<String>,
        line: usize,
        me: PartKey,
        me_spec: PartSpecifier,
        me_label: impl Into<String>,
        params: &[String],
        args: Vec<Value>,
    ) -> Self {
        let locals = params
            .iter()
            .enumerate()
            .map(|(idx, param)| (param.to_lowercase(), args.get(idx).cloned().unwrap_or_default()))
            .collect();
        Self {
            handler: handler.into(),
            line,
            me,
            me_spec,
            me_label: me_label.into(),
            args,
            locals,
            globals: HashSet::new(),
        }
    }

    /// Local variable, if set.
    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(&name.to_lowercase())
    }

    /// Assign a local variable.
    pub fn set_local(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_lowercase(), value);
    }

    /// Make `name` refer to the global of that name for the rest of the handler.
    pub fn declare_global(&mut self, name: &str) {
        self.globals.insert(name.to_lowercase());
    }

    /// Whether `name` was declared global in this handler.
    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(&name.to_lowercase())
    }
}

/// State carried through one dispatch chain: the call stack, the original
/// target, `it`, `the result` and the scope unqualified references resolve in.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    id: Uuid,
    scope: Scope,
    frames: Vec<StackFrame>,
    target: Option<(PartKey, PartSpecifier)>,
    it: Value,
    result: Value,
}

impl ExecutionContext {
    /// Fresh context resolving against `scope`.
    pub fn new(scope: Scope) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            frames: Vec::new(),
            target: None,
            it: Value::Empty,
            result: Value::Empty,
        }
    }

    /// Identifier for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current scope.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Resolve subsequent unqualified references against `scope`; returns the
    /// previous scope so callers can restore it.
    pub fn rebind(&mut self, scope: Scope) -> Scope {
        std::mem::replace(&mut self.scope, scope)
    }

    /// Active frames, outermost first.
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Number of active handlers.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Enter a handler.
    pub fn push_frame(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// Leave the innermost handler.
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    /// Innermost frame.
    pub fn frame(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    /// Innermost frame, mutably.
    pub fn frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    /// Part the chain was first sent to.
    pub fn target(&self) -> Option<&PartSpecifier> {
        self.target.as_ref().map(|(_, spec)| spec)
    }

    /// Key of the original target.
    pub fn target_key(&self) -> Option<PartKey> {
        self.target.as_ref().map(|(key, _)| *key)
    }

    /// Record the original target. Later calls are ignored: the target is
    /// fixed for the whole chain.
    pub fn set_target(&mut self, key: PartKey, spec: PartSpecifier) {
        if self.target.is_none() {
            self.target = Some((key, spec));
        }
    }

    /// The `it` variable.
    pub fn it(&self) -> &Value {
        &self.it
    }

    /// Assign `it`.
    pub fn set_it(&mut self, value: Value) {
        self.it = value;
    }

    /// `the result`.
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Assign `the result`.
    pub fn set_result(&mut self, value: Value) {
        self.result = value;
    }

    /// Position of the innermost executing statement.
    pub fn location(&self) -> Option<SourceLocation> {
        self.frame().map(|frame| SourceLocation {
            part: frame.me_label.clone(),
            handler: frame.handler.clone(),
            line: frame.line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::part::PartType;

    fn scope() -> Scope {
        Scope {
            stack: PartKey::new(),
            background: None,
            card: None,
        }
    }

    #[test]
    fn target_is_fixed_once_set() {
        let mut ctx = ExecutionContext::new(scope());
        let first = PartKey::new();
        ctx.set_target(first, PartSpecifier::by_id(PartType::Button, 1));
        ctx.set_target(PartKey::new(), PartSpecifier::by_id(PartType::Card, 2));
        assert_eq!(ctx.target_key(), Some(first));
        assert_eq!(ctx.target().unwrap().to_string(), "button id 1");
    }

    #[test]
    fn rebind_returns_the_previous_scope() {
        let original = scope();
        let mut ctx = ExecutionContext::new(original);
        let other = scope();
        assert_eq!(ctx.rebind(other), original);
        assert_eq!(ctx.scope(), other);
    }

    #[test]
    fn frames_bind_params_case_insensitively() {
        let me = PartKey::new();
        let mut frame = StackFrame::new(
            "mouseUp",
            1,
            me,
            PartSpecifier::by_id(PartType::Button, 1),
            "card button id 1",
            &["Who".to_string(), "extra".to_string()],
            vec![Value::text("world")],
        );
        assert_eq!(frame.local("who"), Some(&Value::text("world")));
        assert_eq!(frame.local("EXTRA"), Some(&Value::Empty));
        frame.declare_global("Total");
        assert!(frame.is_global("total"));

        let mut ctx = ExecutionContext::new(scope());
        assert!(ctx.location().is_none());
        ctx.push_frame(frame);
        ctx.frame_mut().unwrap().line = 4;
        assert_eq!(ctx.location().unwrap().to_string(), "mouseUp of card button id 1, line 4");
    }
}

//! Statement execution and expression evaluation.

use std::sync::Arc;

use super::ir::{
    BinaryOp, ChunkExpr, ContainerRef, Expr, OrdinalExpr, PartRef, RepeatControl, Statement,
    StatementKind, UnaryOp,
};
use crate::runtime::chunk::{Chunk, Preposition};
use crate::runtime::context::ExecutionContext;
use crate::runtime::dispatch::{Message, MessageOutcome};
use crate::runtime::engine::Engine;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::ordinal::Ordinal;
use crate::runtime::part::{Findable, Owner, PartKey, PartModel, PartType};
use crate::runtime::specifier::PartSpecifier;
use crate::runtime::value::{Point, Rect, SortStyle, Value};

/// How a block finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Ran to the end.
    Completed,
    /// `pass`: hand the message to the next recipient.
    Passed,
    /// `exit handler`
    ExitedHandler,
    /// `exit repeat`
    ExitedRepeat,
    /// `next repeat`
    NextRepeat,
    /// `return value`
    Returned(Value),
}

enum Step {
    Continue,
    Break,
    Leave(Flow),
}

impl Step {
    fn after(flow: Flow) -> Self {
        match flow {
            Flow::Completed | Flow::NextRepeat => Step::Continue,
            Flow::ExitedRepeat => Step::Break,
            other => Step::Leave(other),
        }
    }
}

/// Runs handler bodies against an engine.
pub struct Executor<'e> {
    engine: &'e Engine,
}

impl<'e> Executor<'e> {
    /// Executor bound to `engine`.
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Run a handler body. Loop control that escapes every loop is an error.
    pub fn run_body(&self, ctx: &mut ExecutionContext, body: &[Statement]) -> ScriptResult<Flow> {
        match self.run_block(ctx, body)? {
            Flow::ExitedRepeat | Flow::NextRepeat => Err(located(
                ctx,
                ScriptError::semantic("exit repeat or next repeat outside a repeat loop"),
            )),
            flow => Ok(flow),
        }
    }

    fn run_block(&self, ctx: &mut ExecutionContext, body: &[Statement]) -> ScriptResult<Flow> {
        for statement in body {
            if let Some(frame) = ctx.frame_mut() {
                frame.line = statement.line;
            }
            let flow = self
                .run_statement(ctx, statement)
                .map_err(|err| located(ctx, err))?;
            if flow != Flow::Completed {
                return Ok(flow);
            }
        }
        Ok(Flow::Completed)
    }

    fn run_statement(&self, ctx: &mut ExecutionContext, statement: &Statement) -> ScriptResult<Flow> {
        match &statement.kind {
            StatementKind::Put {
                value,
                preposition,
                destination,
            } => {
                let value = self.evaluate(ctx, value)?;
                let destination = destination.as_ref().unwrap_or(&ContainerRef::MessageBox);
                self.write_container(ctx, destination, *preposition, value)?;
            }
            StatementKind::Get(expr) => {
                let value = self.evaluate(ctx, expr)?;
                ctx.set_it(value);
            }
            StatementKind::Set {
                property,
                adjective,
                part,
                value,
            } => {
                let value = self.evaluate(ctx, value)?;
                let part = match part {
                    Some(part) => self.resolve_part(ctx, part)?,
                    None => self.engine.registry().application().clone(),
                };
                part.properties()
                    .set_with_adjective(property, *adjective, value)?;
            }
            StatementKind::Send { message, args, to } => {
                let args = self.evaluate_all(ctx, args)?;
                let receiver = match to {
                    Some(part) => self.resolve_part(ctx, part)?.key(),
                    None => self.me(ctx)?,
                };
                let outcome = self.send_in_scope(ctx, receiver, &Message::new(message).with_args(args));
                if let Some(err) = outcome.error {
                    return Err(err);
                }
            }
            StatementKind::Command { name, args } => {
                let args = self.evaluate_all(ctx, args)?;
                let me = self.me(ctx)?;
                let message = Message::new(name).with_args(args);
                let outcome = self.engine.send_to_part(ctx, me, &message);
                if let Some(err) = outcome.error {
                    return Err(err);
                }
                if !outcome.trapped {
                    let command = self
                        .engine
                        .host_command(name)
                        .ok_or_else(|| ScriptError::semantic(format!("can't understand '{}'", name)))?;
                    command(self.engine, ctx, &message.args)?;
                }
            }
            StatementKind::Pass => return Ok(Flow::Passed),
            StatementKind::ExitHandler => return Ok(Flow::ExitedHandler),
            StatementKind::ExitRepeat => return Ok(Flow::ExitedRepeat),
            StatementKind::NextRepeat => return Ok(Flow::NextRepeat),
            StatementKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(ctx, expr)?,
                    None => Value::Empty,
                };
                return Ok(Flow::Returned(value));
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let branch = if self.condition(ctx, condition)? {
                    then_branch
                } else {
                    else_branch
                };
                return self.run_block(ctx, branch);
            }
            StatementKind::Repeat { control, body } => return self.run_repeat(ctx, control, body),
            StatementKind::Global(names) => {
                if let Some(frame) = ctx.frame_mut() {
                    for name in names {
                        frame.declare_global(name);
                    }
                }
            }
            StatementKind::Sort {
                granularity,
                container,
                style,
                descending,
            } => {
                let current = self.read_container(ctx, container)?;
                let sorted = current.sort_chunks(
                    *granularity,
                    *style,
                    *descending,
                    self.engine.item_delimiter(),
                );
                self.write_container(ctx, container, Preposition::Into, sorted)?;
            }
        }
        Ok(Flow::Completed)
    }

    fn run_repeat(
        &self,
        ctx: &mut ExecutionContext,
        control: &RepeatControl,
        body: &[Statement],
    ) -> ScriptResult<Flow> {
        match control {
            RepeatControl::Forever => loop {
                self.check_abort()?;
                match Step::after(self.run_block(ctx, body)?) {
                    Step::Continue => {}
                    Step::Break => break,
                    Step::Leave(flow) => return Ok(flow),
                }
            },
            RepeatControl::Times(count) => {
                let count = self.integer(ctx, count)?;
                for _ in 0..count.max(0) {
                    self.check_abort()?;
                    match Step::after(self.run_block(ctx, body)?) {
                        Step::Continue => {}
                        Step::Break => break,
                        Step::Leave(flow) => return Ok(flow),
                    }
                }
            }
            RepeatControl::While(condition) | RepeatControl::Until(condition) => {
                let until = matches!(control, RepeatControl::Until(_));
                loop {
                    self.check_abort()?;
                    if self.condition(ctx, condition)? == until {
                        break;
                    }
                    match Step::after(self.run_block(ctx, body)?) {
                        Step::Continue => {}
                        Step::Break => break,
                        Step::Leave(flow) => return Ok(flow),
                    }
                }
            }
            RepeatControl::With {
                variable,
                from,
                to,
                descending,
            } => {
                let from = self.integer(ctx, from)?;
                let to = self.integer(ctx, to)?;
                let step = if *descending { -1 } else { 1 };
                let mut index = from;
                while (*descending && index >= to) || (!*descending && index <= to) {
                    self.check_abort()?;
                    self.assign_variable(ctx, variable, Value::Integer(index));
                    match Step::after(self.run_block(ctx, body)?) {
                        Step::Continue => {}
                        Step::Break => break,
                        Step::Leave(flow) => return Ok(flow),
                    }
                    // The loop variable is reset each pass; body writes do not steer it.
                    match index.checked_add(step) {
                        Some(next) => index = next,
                        None => break,
                    }
                }
            }
        }
        Ok(Flow::Completed)
    }

    fn check_abort(&self) -> ScriptResult<()> {
        if self.engine.abort_requested() {
            tracing::debug!("script aborted by host");
            Err(ScriptError::Aborted)
        } else {
            Ok(())
        }
    }

    fn send_in_scope(&self, ctx: &mut ExecutionContext, receiver: PartKey, message: &Message) -> MessageOutcome {
        // A part in another stack sees its own stack while handling the message.
        let previous = self
            .engine
            .registry()
            .scope_of(receiver)
            .ok()
            .filter(|scope| scope.stack != ctx.scope().stack)
            .map(|scope| ctx.rebind(scope));
        let outcome = self.engine.send_to_part(ctx, receiver, message);
        if let Some(previous) = previous {
            ctx.rebind(previous);
        }
        outcome
    }

    fn me(&self, ctx: &ExecutionContext) -> ScriptResult<PartKey> {
        ctx.frame()
            .map(|frame| frame.me)
            .ok_or_else(|| ScriptError::semantic("'me' used outside a handler"))
    }

    /// Evaluate `expr` in the innermost frame.
    pub fn evaluate(&self, ctx: &mut ExecutionContext, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => Ok(self.read_variable(ctx, name)),
            Expr::It => Ok(ctx.it().clone()),
            Expr::Me => {
                let me = self.engine.part(self.me(ctx)?)?;
                Ok(part_value(&me))
            }
            Expr::Target => match ctx.target_key() {
                Some(key) => Ok(Value::text(self.engine.part(key)?.describe())),
                None => Ok(Value::Empty),
            },
            Expr::TheResult => Ok(ctx.result().clone()),
            Expr::Property {
                property,
                adjective,
                part,
            } => {
                let part = match part {
                    Some(part) => self.resolve_part(ctx, part)?,
                    None => self.engine.registry().application().clone(),
                };
                part.properties().get_with_adjective(property, *adjective)
            }
            Expr::Chunk { chunk, of } => {
                let value = self.evaluate(ctx, of)?;
                let chunk = self.chunk(ctx, chunk)?;
                Ok(self.engine.get_chunk(&value, &chunk))
            }
            Expr::Count { granularity, of } => {
                let value = self.evaluate(ctx, of)?;
                Ok(Value::from(self.engine.count_chunks(&value, *granularity)))
            }
            Expr::Part(part) => {
                let part = self.resolve_part(ctx, part)?;
                Ok(part_value(&part))
            }
            Expr::Call { name, args } => {
                let args = self.evaluate_all(ctx, args)?;
                let me = self.me(ctx)?;
                self.engine.call_function_from(ctx, me, name, args)
            }
            Expr::Param(index) => {
                let index = self.integer(ctx, index)?;
                let frame = ctx
                    .frame()
                    .ok_or_else(|| ScriptError::semantic("'param' used outside a handler"))?;
                Ok(match index {
                    0 => Value::text(frame.handler.clone()),
                    n if n > 0 => usize::try_from(n - 1)
                        .ok()
                        .and_then(|idx| frame.args.get(idx).cloned())
                        .unwrap_or_default(),
                    _ => Value::Empty,
                })
            }
            Expr::ParamCount => Ok(Value::from(ctx.frame().map_or(0, |frame| frame.args.len()))),
            Expr::Params => Ok(Value::List(
                ctx.frame().map(|frame| frame.args.clone()).unwrap_or_default(),
            )),
            Expr::Unary { op, operand } => {
                let value = self.evaluate(ctx, operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Boolean(!boolean(&value)?)),
                    UnaryOp::Negate => match value {
                        Value::Integer(num) => Ok(num
                            .checked_neg()
                            .map(Value::Integer)
                            .unwrap_or(Value::Real(-(num as f64)))),
                        other => Ok(Value::Real(-number(&other)?)),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(ctx, *op, lhs, rhs),
            Expr::Point(x, y) => {
                let x = self.integer(ctx, x)?;
                let y = self.integer(ctx, y)?;
                Ok(Value::Point(Point::new(x, y)))
            }
            Expr::Rect(coords) => {
                let mut values = [0i64; 4];
                for (slot, coord) in values.iter_mut().zip(coords) {
                    *slot = self.integer(ctx, coord)?;
                }
                let [left, top, right, bottom] = values;
                Ok(Value::Rect(Rect::new(left, top, right, bottom)))
            }
        }
    }

    fn evaluate_all(&self, ctx: &mut ExecutionContext, exprs: &[Expr]) -> ScriptResult<Vec<Value>> {
        exprs.iter().map(|expr| self.evaluate(ctx, expr)).collect()
    }

    fn condition(&self, ctx: &mut ExecutionContext, expr: &Expr) -> ScriptResult<bool> {
        boolean(&self.evaluate(ctx, expr)?)
    }

    fn integer(&self, ctx: &mut ExecutionContext, expr: &Expr) -> ScriptResult<i64> {
        let value = self.evaluate(ctx, expr)?;
        if value.is_empty() {
            return Ok(0);
        }
        value
            .as_integer()
            .ok_or_else(|| ScriptError::semantic(format!("expected an integer, got '{}'", value)))
    }

    fn binary(&self, ctx: &mut ExecutionContext, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> ScriptResult<Value> {
        match op {
            BinaryOp::And => {
                if !self.condition(ctx, lhs)? {
                    return Ok(Value::Boolean(false));
                }
                return Ok(Value::Boolean(self.condition(ctx, rhs)?));
            }
            BinaryOp::Or => {
                if self.condition(ctx, lhs)? {
                    return Ok(Value::Boolean(true));
                }
                return Ok(Value::Boolean(self.condition(ctx, rhs)?));
            }
            _ => {}
        }
        let left = self.evaluate(ctx, lhs)?;
        let right = self.evaluate(ctx, rhs)?;
        match op {
            BinaryOp::Concat => Ok(Value::Text(format!("{}{}", left, right))),
            BinaryOp::ConcatSpace => Ok(Value::Text(format!("{} {}", left, right))),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                arithmetic(op, &left, &right)
            }
            BinaryOp::Eq => Ok(Value::Boolean(left.equals(&right))),
            BinaryOp::Ne => Ok(Value::Boolean(!left.equals(&right))),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let order = left.compare(&right, SortStyle::Numeric);
                Ok(Value::Boolean(match op {
                    BinaryOp::Lt => order.is_lt(),
                    BinaryOp::Gt => order.is_gt(),
                    BinaryOp::Le => order.is_le(),
                    _ => order.is_ge(),
                }))
            }
            BinaryOp::Contains => Ok(Value::Boolean(
                left.string_value()
                    .to_lowercase()
                    .contains(&right.string_value().to_lowercase()),
            )),
            BinaryOp::And | BinaryOp::Or => Err(ScriptError::semantic("unreachable boolean operator")),
        }
    }

    fn chunk(&self, ctx: &mut ExecutionContext, expr: &ChunkExpr) -> ScriptResult<Chunk> {
        let start = self.ordinal(ctx, &expr.start)?;
        let mut chunk = Chunk::new(expr.granularity, start);
        if let Some(end) = &expr.end {
            chunk = chunk.through(self.ordinal(ctx, end)?);
        }
        if let Some(outer) = &expr.of {
            chunk = chunk.within(self.chunk(ctx, outer)?);
        }
        Ok(chunk)
    }

    fn ordinal(&self, ctx: &mut ExecutionContext, expr: &OrdinalExpr) -> ScriptResult<Ordinal> {
        match expr {
            OrdinalExpr::Fixed(ordinal) => Ok(*ordinal),
            OrdinalExpr::Computed(expr) => Ordinal::from_value(&self.evaluate(ctx, expr)?),
        }
    }

    fn read_variable(&self, ctx: &ExecutionContext, name: &str) -> Value {
        match ctx.frame() {
            Some(frame) if frame.is_global(name) => self.engine.global(name),
            Some(frame) => frame
                .local(name)
                .cloned()
                .unwrap_or_else(|| Value::text(name)),
            None => Value::text(name),
        }
    }

    fn assign_variable(&self, ctx: &mut ExecutionContext, name: &str, value: Value) {
        match ctx.frame_mut() {
            Some(frame) if frame.is_global(name) => self.engine.set_global(name, value),
            Some(frame) => frame.set_local(name, value),
            None => self.engine.set_global(name, value),
        }
    }

    fn resolve_part(&self, ctx: &mut ExecutionContext, part: &PartRef) -> ScriptResult<Arc<PartModel>> {
        match part {
            PartRef::Me => self.engine.part(self.me(ctx)?),
            PartRef::Target => {
                let key = ctx
                    .target_key()
                    .ok_or_else(|| ScriptError::PartNotFound("target".into()))?;
                self.engine.part(key)
            }
            PartRef::MessageBox => Ok(self.engine.registry().message_box().clone()),
            other => {
                let spec = self.specifier(ctx, other)?;
                self.engine.resolve(&ctx.scope(), &spec)
            }
        }
    }

    fn specifier(&self, ctx: &mut ExecutionContext, part: &PartRef) -> ScriptResult<PartSpecifier> {
        let with_owner = |spec: PartSpecifier, owner: Option<Owner>| match owner {
            Some(owner) => spec.on(owner),
            None => spec,
        };
        Ok(match part {
            PartRef::Id { part_type, owner, id } => {
                let id = self.integer(ctx, id)?;
                with_owner(PartSpecifier::by_id(*part_type, id), *owner)
            }
            PartRef::Lookup { part_type, owner, key } => {
                let key = self.evaluate(ctx, key)?;
                let spec = match key.as_integer() {
                    Some(number) => PartSpecifier::by_number(*part_type, number),
                    None => PartSpecifier::by_name(*part_type, key.string_value()),
                };
                with_owner(spec, *owner)
            }
            PartRef::Ordinal {
                part_type,
                owner,
                ordinal,
            } => with_owner(PartSpecifier::by_ordinal(*part_type, *ordinal), *owner),
            PartRef::This(part_type) => PartSpecifier::This(*part_type),
            PartRef::MessageBox => PartSpecifier::MessageBox,
            PartRef::Me | PartRef::Target => self.resolve_part(ctx, part)?.specifier(),
            PartRef::Of { part, container } => {
                let container = self.specifier(ctx, container)?;
                self.specifier(ctx, part)?.of(container)
            }
        })
    }

    fn read_container(&self, ctx: &mut ExecutionContext, container: &ContainerRef) -> ScriptResult<Value> {
        match container {
            ContainerRef::Variable(name) => Ok(match ctx.frame() {
                Some(frame) if frame.is_global(name) => self.engine.global(name),
                Some(frame) => frame.local(name).cloned().unwrap_or_default(),
                None => Value::Empty,
            }),
            ContainerRef::It => Ok(ctx.it().clone()),
            ContainerRef::MessageBox => self.engine.registry().message_box().properties().get("contents"),
            ContainerRef::Part(part) => self.resolve_part(ctx, part)?.properties().get("contents"),
            ContainerRef::Chunk { chunk, container } => {
                let value = self.read_container(ctx, container)?;
                let chunk = self.chunk(ctx, chunk)?;
                Ok(self.engine.get_chunk(&value, &chunk))
            }
        }
    }

    fn write_container(
        &self,
        ctx: &mut ExecutionContext,
        container: &ContainerRef,
        preposition: Preposition,
        value: Value,
    ) -> ScriptResult<()> {
        if let ContainerRef::Chunk { chunk, container } = container {
            let current = self.read_container(ctx, container)?;
            let chunk = self.chunk(ctx, chunk)?;
            let updated = self.engine.set_chunk(&current, preposition, &chunk, &value);
            return self.write_container(ctx, container, Preposition::Into, updated);
        }
        let value = match preposition {
            Preposition::Into => value,
            Preposition::Before => Value::Text(format!("{}{}", value, self.read_container(ctx, container)?)),
            Preposition::After => Value::Text(format!("{}{}", self.read_container(ctx, container)?, value)),
        };
        match container {
            ContainerRef::Variable(name) => self.assign_variable(ctx, name, value),
            ContainerRef::It => ctx.set_it(value),
            ContainerRef::MessageBox => self
                .engine
                .registry()
                .message_box()
                .properties()
                .set("contents", value)?,
            ContainerRef::Part(part) => self.resolve_part(ctx, part)?.properties().set("contents", value)?,
            ContainerRef::Chunk { .. } => {}
        }
        Ok(())
    }
}

fn located(ctx: &ExecutionContext, err: ScriptError) -> ScriptError {
    match ctx.location() {
        Some(location) => err.at(location),
        None => err,
    }
}

/// Value a part stands for in an expression: a field or button's contents,
/// otherwise its name.
fn part_value(part: &PartModel) -> Value {
    match part.part_type() {
        PartType::Field | PartType::Button | PartType::MessageBox => part
            .properties()
            .get("contents")
            .unwrap_or_default(),
        _ => Value::text(part.describe()),
    }
}

fn boolean(value: &Value) -> ScriptResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ScriptError::semantic(format!("expected true or false, got '{}'", value)))
}

fn number(value: &Value) -> ScriptResult<f64> {
    if value.is_empty() {
        return Ok(0.0);
    }
    value
        .as_number()
        .ok_or_else(|| ScriptError::semantic(format!("expected a number, got '{}'", value)))
}

/// Integer reading for exact arithmetic: integers and integral text, with empty as zero.
fn exact(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(num) => Some(*num),
        Value::Empty => Some(0),
        Value::Text(text) if text.trim().is_empty() => Some(0),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && number(right)? == 0.0 {
        return Err(ScriptError::semantic("division by zero"));
    }
    if op != BinaryOp::Div {
        if let (Some(lhs), Some(rhs)) = (exact(left), exact(right)) {
            let checked = match op {
                BinaryOp::Add => lhs.checked_add(rhs),
                BinaryOp::Sub => lhs.checked_sub(rhs),
                BinaryOp::Mul => lhs.checked_mul(rhs),
                _ => lhs.checked_rem(rhs),
            };
            if let Some(result) = checked {
                return Ok(Value::Integer(result));
            }
        }
    }
    let lhs = number(left)?;
    let rhs = number(right)?;
    Ok(Value::Real(match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => lhs / rhs,
        _ => lhs % rhs,
    }))
}

/// Functions answered by the runtime when no script defines the name.
pub fn builtin_function(name: &str, args: &[Value]) -> Option<ScriptResult<Value>> {
    let arg = |idx: usize| args.get(idx).cloned().unwrap_or_default();
    let result = match name.to_ascii_lowercase().as_str() {
        "length" | "len" => Ok(Value::from(arg(0).string_value().chars().count())),
        "toupper" | "upper" => Ok(Value::Text(arg(0).string_value().to_uppercase())),
        "tolower" | "lower" => Ok(Value::Text(arg(0).string_value().to_lowercase())),
        "abs" => match arg(0) {
            Value::Integer(num) => Ok(num
                .checked_abs()
                .map(Value::Integer)
                .unwrap_or(Value::Real((num as f64).abs()))),
            other => number(&other).map(|num| Value::Real(num.abs())),
        },
        "max" | "min" => {
            let wants_max = name.eq_ignore_ascii_case("max");
            args.iter().try_fold(None::<Value>, |best, value| -> ScriptResult<Option<Value>> {
                number(value)?;
                Ok(Some(match best {
                    Some(best) => {
                        let order = value.compare(&best, SortStyle::Numeric);
                        if order.is_gt() == wants_max && order.is_ne() { value.clone() } else { best }
                    }
                    None => value.clone(),
                }))
            })
            .map(Option::unwrap_or_default)
        }
        "offset" => {
            let needle = arg(0).string_value();
            let haystack = arg(1).string_value();
            Ok(Value::from(
                haystack
                    .find(&needle)
                    .filter(|_| !needle.is_empty())
                    .map_or(0, |byte| haystack[..byte].chars().count() + 1),
            ))
        }
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeConfig;
    use crate::runtime::ordinal::FixedSource;

    struct Fixture {
        engine: Engine,
        card: PartKey,
        field: PartKey,
    }

    fn fixture() -> Fixture {
        let mut engine = Engine::new(RuntimeConfig::default()).with_ordinal_source(FixedSource(0));
        let stack = engine.registry_mut().add_stack("Home");
        let card = engine.registry().cards(stack).unwrap()[0];
        let field = engine
            .registry_mut()
            .add_part(card, PartType::Field, "Notes")
            .unwrap();
        Fixture { engine, card, field }
    }

    /// Run `(on test () …body)` on the card and return `it`, or the error.
    fn run(f: &Fixture, body: &str) -> ScriptResult<Value> {
        let card = f.engine.part(f.card).unwrap();
        card.set_script(format!("(on test ()\n{})", body));
        let mut ctx = f.engine.new_context().unwrap();
        let outcome = f.engine.send_to_part(&mut ctx, f.card, &Message::new("test"));
        match outcome.error {
            Some(err) => Err(err),
            None => Ok(ctx.it().clone()),
        }
    }

    #[test]
    fn arithmetic_stays_exact_until_it_cannot() {
        let f = fixture();
        assert_eq!(run(&f, "(get (+ 2 \"3\"))").unwrap(), Value::Integer(5));
        assert_eq!(run(&f, "(get (+ empty 4))").unwrap(), Value::Integer(4));
        assert_eq!(run(&f, "(get (/ 7 2))").unwrap(), Value::Real(3.5));
        assert_eq!(run(&f, "(get (mod 7 3))").unwrap(), Value::Integer(1));
        assert_eq!(
            run(&f, "(get (* 9223372036854775807 2))").unwrap(),
            Value::Real(9223372036854775807.0 * 2.0)
        );
        let err = run(&f, "(get (/ 1 0))").unwrap_err();
        assert_eq!(err.root(), &ScriptError::semantic("division by zero"));
    }

    #[test]
    fn errors_carry_the_failing_line() {
        let f = fixture();
        let err = run(&f, "(get 1)\n(get (+ \"a\" 1))").unwrap_err();
        let location = err.location().expect("located");
        assert_eq!(location.line, 3);
        assert_eq!(location.handler, "test");
    }

    #[test]
    fn put_into_chunks_of_fields() {
        let f = fixture();
        let field = f.engine.part(f.field).unwrap();
        field.properties().set("contents", "one two three").unwrap();
        run(&f, "(put \"TWO\" into (word 2 of (field \"Notes\")))").unwrap();
        assert_eq!(
            field.properties().get("contents").unwrap(),
            Value::text("one TWO three")
        );
        run(&f, "(put \"!\" after (field 1))").unwrap();
        assert_eq!(
            field.properties().get("contents").unwrap(),
            Value::text("one TWO three!")
        );
        assert_eq!(
            run(&f, "(get (word last of (field \"notes\")))").unwrap(),
            Value::text("three!")
        );
    }

    #[test]
    fn repeat_forms() {
        let f = fixture();
        assert_eq!(
            run(&f, "(put 0 into n) (repeat (with i 1 5) (put (+ n i) into n)) (get n)").unwrap(),
            Value::Integer(15)
        );
        assert_eq!(
            run(&f, "(put empty into s) (repeat (with i 3 down 1) (put i after s)) (get s)").unwrap(),
            Value::text("321")
        );
        assert_eq!(
            run(
                &f,
                "(put 0 into n) (repeat (put (+ n 1) into n) (if (= n 4) (exit repeat))) (get n)"
            )
            .unwrap(),
            Value::Integer(4)
        );
        assert_eq!(
            run(
                &f,
                "(put 0 into n) (repeat (while (< n 10)) (put (+ n 3) into n)) (get n)"
            )
            .unwrap(),
            Value::Integer(12)
        );
    }

    #[test]
    fn chunk_positions_can_be_computed() {
        let f = fixture();
        assert_eq!(
            run(&f, "(put 2 into k) (get (word k of \"alpha beta gamma\"))").unwrap(),
            Value::text("beta")
        );
        assert_eq!(
            run(&f, "(put \"a,b,c,d\" into x) (get (item (+ 1 1) to (- 5 1) of x))").unwrap(),
            Value::text("b,c,d")
        );
        let err = run(&f, "(put 0 into k) (get (char k of \"abc\"))").unwrap_err();
        assert!(matches!(err.root(), ScriptError::InvalidOrdinal { .. }));
    }

    #[test]
    fn counting_loops_stop_at_the_integer_limits() {
        let f = fixture();
        assert_eq!(
            run(&f, "(put 0 into n) (repeat (with i 9223372036854775806 9223372036854775807) (put (+ n 1) into n)) (get n)")
                .unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            run(&f, "(put 0 into n) (repeat (with i -9223372036854775807 down -9223372036854775808) (put (+ n 1) into n)) (get n)")
                .unwrap(),
            Value::Integer(2)
        );
    }

    #[test]
    fn oversized_rectangles_fail_without_panicking() {
        let f = fixture();
        let err = run(
            &f,
            "(set rect of (field 1) to \"-9223372036854775808,0,9223372036854775807,10\")\n(get (the width of (field 1)))",
        )
        .unwrap_err();
        assert_eq!(err.category(), crate::runtime::error::ErrorCategory::Semantic);
        assert_eq!(run(&f, "(get (the height of (field 1)))").unwrap(), Value::Integer(10));
    }

    #[test]
    fn abort_stops_loops_and_is_cleared_afterwards() {
        let f = fixture();
        f.engine.request_abort();
        let err = run(&f, "(repeat forever (get 1))").unwrap_err();
        assert_eq!(err.root(), &ScriptError::Aborted);
        assert!(!f.engine.abort_requested());
    }

    #[test]
    fn unset_variables_read_as_their_name_and_globals_are_shared() {
        let f = fixture();
        assert_eq!(run(&f, "(get hello)").unwrap(), Value::text("hello"));
        run(&f, "(global total) (put 10 into total)").unwrap();
        assert_eq!(f.engine.global("total"), Value::Integer(10));
        assert_eq!(run(&f, "(get total)").unwrap(), Value::text("total"));
        assert_eq!(run(&f, "(global Total) (get total)").unwrap(), Value::Integer(10));
    }

    #[test]
    fn unknown_commands_fall_back_to_host_commands() {
        let f = fixture();
        f.engine.register_command("remember", |engine, _, args| {
            engine.set_global("remembered", args.first().cloned().unwrap_or_default());
            Ok(())
        });
        run(&f, "(remember \"x\")").unwrap();
        assert_eq!(f.engine.global("remembered"), Value::text("x"));
        let err = run(&f, "(frobnicate)").unwrap_err();
        assert_eq!(err.root(), &ScriptError::semantic("can't understand 'frobnicate'"));
    }

    #[test]
    fn properties_and_sort() {
        let f = fixture();
        run(&f, "(set name of (field 1) to \"Body\")").unwrap();
        assert_eq!(
            run(&f, "(get (the short name of (field 1)))").unwrap(),
            Value::text("Body")
        );
        assert_eq!(
            run(&f, "(put \"b,c,a\" into x) (sort items of x) (get x)").unwrap(),
            Value::text("a,b,c")
        );
        assert_eq!(
            run(&f, "(put \"10,9,100\" into x) (sort items of x :numeric :descending) (get x)").unwrap(),
            Value::text("100,10,9")
        );
        let err = run(&f, "(set id of (field 1) to 5)").unwrap_err();
        assert_eq!(err.category(), crate::runtime::error::ErrorCategory::Permission);
    }

    #[test]
    fn builtins() {
        assert_eq!(
            builtin_function("offset", &[Value::text("é"), Value::text("café")]),
            Some(Ok(Value::Integer(4)))
        );
        assert_eq!(
            builtin_function("max", &[Value::Integer(3), Value::text("12"), Value::Integer(7)]),
            Some(Ok(Value::text("12")))
        );
        assert_eq!(builtin_function("nope", &[]), None);
    }
}

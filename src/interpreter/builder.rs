use std::collections::HashMap;
use std::sync::Arc;

use super::ast::{Expr as Form, ScriptSource};
use crate::interpreter::ir::{
    BinaryOp, ChunkExpr, ContainerRef, Expr, Handler, OrdinalExpr, PartRef, RepeatControl, Script,
    Statement, StatementKind, UnaryOp,
};
use crate::runtime::chunk::{Granularity, Preposition};
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::ordinal::Ordinal;
use crate::runtime::part::{Owner, PartType};
use crate::runtime::property::Adjective;
use crate::runtime::value::{SortStyle, Value};

/// Build a compiled [`Script`] from parsed forms.
///
/// Top-level forms are `(on name (params…) statement…)` and
/// `(function name (params…) statement…)`. When a name is defined twice the
/// first definition wins.
pub fn build_script(source: &ScriptSource) -> ScriptResult<Script> {
    let mut handlers: HashMap<String, Arc<Handler>> = HashMap::new();
    let mut functions: HashMap<String, Arc<Handler>> = HashMap::new();

    for form in &source.forms {
        let (items, line) = expect_list(form, 0, "handler")?;
        let table = match items.first() {
            Some(head) if head.is_symbol("on") => &mut handlers,
            Some(head) if head.is_symbol("function") => &mut functions,
            _ => {
                return Err(syntax(line, "top-level forms must be (on …) or (function …)"));
            }
        };
        let handler = parse_handler(items, line)?;
        table
            .entry(handler.name.to_lowercase())
            .or_insert_with(|| Arc::new(handler));
    }

    Ok(Script {
        handlers,
        functions,
    })
}

fn parse_handler(items: &[Form], line: usize) -> ScriptResult<Handler> {
    if items.len() < 3 {
        return Err(syntax(line, "handler requires a name and a parameter list"));
    }
    let name = expect_symbol(&items[1], line)?.to_string();
    let (param_forms, _) = expect_list(&items[2], line, "parameter list")?;
    let params = param_forms
        .iter()
        .map(|param| expect_symbol(param, line).map(str::to_string))
        .collect::<ScriptResult<Vec<_>>>()?;
    let body = parse_block(&items[3..], line)?;
    Ok(Handler {
        name,
        params,
        body,
        line,
    })
}

fn parse_block(forms: &[Form], line: usize) -> ScriptResult<Vec<Statement>> {
    let mut body = Vec::new();
    for form in forms {
        push_statement(&mut body, form, line)?;
    }
    Ok(body)
}

/// Parse one statement form, splicing `(do …)` blocks into `body`.
fn push_statement(body: &mut Vec<Statement>, form: &Form, line: usize) -> ScriptResult<()> {
    if let Form::List { items, line } = form {
        if items.first().is_some_and(|head| head.is_symbol("do")) {
            for inner in &items[1..] {
                push_statement(body, inner, *line)?;
            }
            return Ok(());
        }
    }
    body.push(parse_statement(form, line)?);
    Ok(())
}

fn parse_statement(form: &Form, parent_line: usize) -> ScriptResult<Statement> {
    let single;
    let (items, line): (&[Form], usize) = match form {
        Form::List { items, line } => (items, *line),
        // A bare symbol is a statement without arguments: `pass`, `beep`.
        Form::Symbol(_) => {
            single = [form.clone()];
            (&single, parent_line)
        }
        _ => return Err(syntax(parent_line, "statements must be lists")),
    };
    let head = items
        .first()
        .ok_or_else(|| syntax(line, "empty statement"))?;
    let name = expect_symbol(head, line)?;
    let args = &items[1..];

    let kind = match name.to_ascii_lowercase().as_str() {
        "put" => parse_put(args, line)?,
        "get" => {
            expect_arity(args, 1, line, "get")?;
            StatementKind::Get(parse_expr(&args[0], line)?)
        }
        "set" => parse_set(args, line)?,
        "send" => parse_send(args, line)?,
        "pass" => StatementKind::Pass,
        "exit" => match args.first() {
            Some(form) if form.is_symbol("repeat") => StatementKind::ExitRepeat,
            _ => StatementKind::ExitHandler,
        },
        "next" => match args.first() {
            Some(form) if form.is_symbol("repeat") => StatementKind::NextRepeat,
            _ => return Err(syntax(line, "expected (next repeat)")),
        },
        "return" => match args {
            [] => StatementKind::Return(None),
            [value] => StatementKind::Return(Some(parse_expr(value, line)?)),
            _ => return Err(syntax(line, "return takes at most one value")),
        },
        "if" => parse_if(args, line)?,
        "repeat" => parse_repeat(args, line)?,
        "global" => StatementKind::Global(
            args.iter()
                .map(|arg| expect_symbol(arg, line).map(str::to_string))
                .collect::<ScriptResult<_>>()?,
        ),
        "sort" => parse_sort(args, line)?,
        _ => StatementKind::Command {
            name: name.to_string(),
            args: parse_exprs(args, line)?,
        },
    };
    Ok(Statement { line, kind })
}

fn parse_put(args: &[Form], line: usize) -> ScriptResult<StatementKind> {
    match args {
        [value] => Ok(StatementKind::Put {
            value: parse_expr(value, line)?,
            preposition: Preposition::Into,
            destination: None,
        }),
        [value, preposition, destination] => {
            let preposition = match expect_symbol(preposition, line)?.to_ascii_lowercase().as_str() {
                "into" => Preposition::Into,
                "before" => Preposition::Before,
                "after" => Preposition::After,
                other => {
                    return Err(syntax(line, format!("expected into, before or after, found '{}'", other)));
                }
            };
            Ok(StatementKind::Put {
                value: parse_expr(value, line)?,
                preposition,
                destination: Some(parse_container(destination, line)?),
            })
        }
        _ => Err(syntax(line, "expected (put value [into|before|after container])")),
    }
}

fn parse_set(args: &[Form], line: usize) -> ScriptResult<StatementKind> {
    let to = args
        .iter()
        .position(|form| form.is_symbol("to"))
        .ok_or_else(|| syntax(line, "expected (set property [of part] to value)"))?;
    if to + 2 != args.len() {
        return Err(syntax(line, "set takes exactly one value after 'to'"));
    }
    let (adjective, property, part) = parse_property_ref(&args[..to], line)?;
    Ok(StatementKind::Set {
        property,
        adjective,
        part,
        value: parse_expr(&args[to + 1], line)?,
    })
}

/// `[adjective] property [of part]`
fn parse_property_ref(
    forms: &[Form],
    line: usize,
) -> ScriptResult<(Option<Adjective>, String, Option<PartRef>)> {
    let (adjective, rest) = match forms {
        [first, rest @ ..] if !rest.is_empty() => {
            match first.as_symbol().and_then(Adjective::from_keyword) {
                Some(adjective) => (Some(adjective), rest),
                None => (None, forms),
            }
        }
        _ => (None, forms),
    };
    match rest {
        [property] => Ok((adjective, expect_symbol(property, line)?.to_string(), None)),
        [property, of, part] if of.is_symbol("of") => Ok((
            adjective,
            expect_symbol(property, line)?.to_string(),
            Some(parse_part(part, line)?),
        )),
        _ => Err(syntax(line, "expected [adjective] property [of part]")),
    }
}

fn parse_send(args: &[Form], line: usize) -> ScriptResult<StatementKind> {
    let (message, rest) = args
        .split_first()
        .ok_or_else(|| syntax(line, "send requires a message name"))?;
    let message = match message {
        Form::Symbol(name) | Form::String(name) => name.clone(),
        _ => return Err(syntax(line, "message name must be a symbol or string")),
    };
    let (arg_forms, to) = match rest.iter().position(|form| form.is_symbol("to")) {
        Some(idx) if idx + 2 == rest.len() => (&rest[..idx], Some(parse_part(&rest[idx + 1], line)?)),
        Some(_) => return Err(syntax(line, "expected a single part after 'to'")),
        None => (rest, None),
    };
    Ok(StatementKind::Send {
        message,
        args: parse_exprs(arg_forms, line)?,
        to,
    })
}

fn parse_if(args: &[Form], line: usize) -> ScriptResult<StatementKind> {
    let (condition, then_form, else_form) = match args {
        [condition, then_form] => (condition, then_form, None),
        [condition, then_form, else_form] => (condition, then_form, Some(else_form)),
        [condition, then_form, keyword, else_form] if keyword.is_symbol("else") => {
            (condition, then_form, Some(else_form))
        }
        _ => return Err(syntax(line, "expected (if condition then [else])")),
    };
    let mut then_branch = Vec::new();
    push_statement(&mut then_branch, then_form, line)?;
    let mut else_branch = Vec::new();
    if let Some(else_form) = else_form {
        push_statement(&mut else_branch, else_form, line)?;
    }
    Ok(StatementKind::If {
        condition: parse_expr(condition, line)?,
        then_branch,
        else_branch,
    })
}

fn parse_repeat(args: &[Form], line: usize) -> ScriptResult<StatementKind> {
    let (control, body) = match args.split_first() {
        Some((first, rest)) if first.is_symbol("forever") => (RepeatControl::Forever, rest),
        Some((Form::List { items, line: control_line }, rest))
            if items.first().is_some_and(|head| {
                ["times", "for", "while", "until", "with"]
                    .iter()
                    .any(|word| head.is_symbol(word))
            }) =>
        {
            (parse_repeat_control(items, *control_line)?, rest)
        }
        _ => (RepeatControl::Forever, args),
    };
    Ok(StatementKind::Repeat {
        control,
        body: parse_block(body, line)?,
    })
}

fn parse_repeat_control(items: &[Form], line: usize) -> ScriptResult<RepeatControl> {
    let keyword = expect_symbol(&items[0], line)?.to_ascii_lowercase();
    let args = &items[1..];
    match keyword.as_str() {
        "times" | "for" => {
            expect_arity(args, 1, line, &keyword)?;
            Ok(RepeatControl::Times(parse_expr(&args[0], line)?))
        }
        "while" => {
            expect_arity(args, 1, line, "while")?;
            Ok(RepeatControl::While(parse_expr(&args[0], line)?))
        }
        "until" => {
            expect_arity(args, 1, line, "until")?;
            Ok(RepeatControl::Until(parse_expr(&args[0], line)?))
        }
        _ => {
            let (variable, from, to, descending) = match args {
                [variable, from, to] => (variable, from, to, false),
                [variable, from, down, to] if down.is_symbol("down") => (variable, from, to, true),
                _ => return Err(syntax(line, "expected (with variable from [down] to)")),
            };
            Ok(RepeatControl::With {
                variable: expect_symbol(variable, line)?.to_string(),
                from: parse_expr(from, line)?,
                to: parse_expr(to, line)?,
                descending,
            })
        }
    }
}

fn parse_sort(args: &[Form], line: usize) -> ScriptResult<StatementKind> {
    let mut rest = args;
    let granularity = match rest.first().and_then(Form::as_symbol).and_then(Granularity::from_keyword) {
        Some(granularity) => {
            rest = &rest[1..];
            granularity
        }
        None => Granularity::Line,
    };
    if rest.first().is_some_and(|form| form.is_symbol("of")) {
        rest = &rest[1..];
    }
    let (container, options) = rest
        .split_first()
        .ok_or_else(|| syntax(line, "sort requires a container"))?;
    let mut style = SortStyle::Text;
    let mut descending = false;
    for option in options {
        let word = match option {
            Form::Symbol(word) | Form::Keyword(word) => word.to_ascii_lowercase(),
            _ => return Err(syntax(line, "unexpected sort option")),
        };
        match word.as_str() {
            "ascending" => descending = false,
            "descending" => descending = true,
            "text" => style = SortStyle::Text,
            "numeric" => style = SortStyle::Numeric,
            "international" => style = SortStyle::International,
            other => return Err(syntax(line, format!("unknown sort option '{}'", other))),
        }
    }
    Ok(StatementKind::Sort {
        granularity,
        container: parse_container(container, line)?,
        style,
        descending,
    })
}

fn parse_exprs(forms: &[Form], line: usize) -> ScriptResult<Vec<Expr>> {
    forms.iter().map(|form| parse_expr(form, line)).collect()
}

fn parse_expr(form: &Form, line: usize) -> ScriptResult<Expr> {
    match form {
        Form::Integer(num) => Ok(Expr::Literal(Value::Integer(*num))),
        Form::Float(num) => Ok(Expr::Literal(Value::Real(*num))),
        Form::String(text) => Ok(Expr::Literal(Value::Text(text.clone()))),
        Form::Boolean(flag) => Ok(Expr::Literal(Value::Boolean(*flag))),
        Form::Keyword(keyword) => Err(syntax(line, format!("unexpected keyword :{}", keyword))),
        Form::Symbol(symbol) => Ok(parse_symbol(symbol)),
        Form::List { items, line } => parse_list_expr(items, *line),
    }
}

fn parse_symbol(symbol: &str) -> Expr {
    let constant = |text: &str| Expr::Literal(Value::text(text));
    match symbol.to_ascii_lowercase().as_str() {
        "it" => Expr::It,
        "me" => Expr::Me,
        "target" => Expr::Target,
        "msg" => Expr::Part(Box::new(PartRef::MessageBox)),
        "empty" => Expr::Literal(Value::Empty),
        "space" => constant(" "),
        "tab" => constant("\t"),
        "return" | "cr" | "linefeed" => constant("\n"),
        "comma" => constant(","),
        "quote" => constant("\""),
        "colon" => constant(":"),
        _ => Expr::Variable(symbol.to_string()),
    }
}

fn binary_op(symbol: &str) -> Option<BinaryOp> {
    Some(match symbol.to_ascii_lowercase().as_str() {
        "&" => BinaryOp::Concat,
        "&&" => BinaryOp::ConcatSpace,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "mod" => BinaryOp::Mod,
        "=" | "is" => BinaryOp::Eq,
        "<>" | "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "and" => BinaryOp::And,
        "or" => BinaryOp::Or,
        "contains" => BinaryOp::Contains,
        _ => return None,
    })
}

fn parse_list_expr(items: &[Form], line: usize) -> ScriptResult<Expr> {
    let head = items
        .first()
        .ok_or_else(|| syntax(line, "empty expression"))?;
    let name = expect_symbol(head, line)?;
    let args = &items[1..];
    let lower = name.to_ascii_lowercase();

    if lower == "-" && args.len() == 1 {
        return Ok(Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(parse_expr(&args[0], line)?),
        });
    }
    if let Some(op) = binary_op(&lower) {
        if args.len() < 2 {
            return Err(syntax(line, format!("'{}' needs two operands", name)));
        }
        // Left fold: (& a b c) is (& (& a b) c).
        let mut operands = args.iter();
        let mut acc = parse_expr(operands.next().unwrap_or(&args[0]), line)?;
        for operand in operands {
            acc = Expr::Binary {
                op,
                lhs: Box::new(acc),
                rhs: Box::new(parse_expr(operand, line)?),
            };
        }
        return Ok(acc);
    }
    if Granularity::from_keyword(&lower).is_some() && args.len() >= 3 {
        let (chunk, base) = parse_chunk(items, line)?;
        return Ok(Expr::Chunk {
            chunk,
            of: Box::new(parse_expr(base, line)?),
        });
    }
    if is_part_form(items) {
        return Ok(Expr::Part(Box::new(parse_part_items(items, line)?)));
    }

    match lower.as_str() {
        "not" => {
            expect_arity(args, 1, line, "not")?;
            Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(parse_expr(&args[0], line)?),
            })
        }
        "the" => parse_the(args, line),
        "number" => parse_count(args, line),
        "param" => {
            expect_arity(args, 1, line, "param")?;
            Ok(Expr::Param(Box::new(parse_expr(&args[0], line)?)))
        }
        "paramcount" if args.is_empty() => Ok(Expr::ParamCount),
        "params" if args.is_empty() => Ok(Expr::Params),
        "result" if args.is_empty() => Ok(Expr::TheResult),
        "target" if args.is_empty() => Ok(Expr::Target),
        "point" => {
            expect_arity(args, 2, line, "point")?;
            Ok(Expr::Point(
                Box::new(parse_expr(&args[0], line)?),
                Box::new(parse_expr(&args[1], line)?),
            ))
        }
        "rect" => {
            expect_arity(args, 4, line, "rect")?;
            Ok(Expr::Rect(parse_exprs(args, line)?))
        }
        _ => Ok(Expr::Call {
            name: name.to_string(),
            args: parse_exprs(args, line)?,
        }),
    }
}

/// `(the target)`, `(the result)`, `(the number of words in x)`,
/// `(the [adjective] property [of part])`
fn parse_the(args: &[Form], line: usize) -> ScriptResult<Expr> {
    if let [single] = args {
        match single.as_symbol().map(str::to_ascii_lowercase).as_deref() {
            Some("target") => return Ok(Expr::Target),
            Some("result") => return Ok(Expr::TheResult),
            Some("params") => return Ok(Expr::Params),
            Some("paramcount") => return Ok(Expr::ParamCount),
            _ => {}
        }
    }
    if args.first().is_some_and(|form| form.is_symbol("number"))
        && args.get(1).is_some_and(|form| form.is_symbol("of"))
    {
        return parse_count(&args[1..], line);
    }
    let (adjective, property, part) = parse_property_ref(args, line)?;
    Ok(Expr::Property {
        property,
        adjective,
        part: part.map(Box::new),
    })
}

/// `(number words x)` or `(number of words in x)`
fn parse_count(args: &[Form], line: usize) -> ScriptResult<Expr> {
    let words: Vec<&Form> = args
        .iter()
        .filter(|form| !form.is_symbol("of") && !form.is_symbol("in"))
        .collect();
    match words.as_slice() {
        [unit, of] => {
            let granularity = unit
                .as_symbol()
                .and_then(Granularity::from_keyword)
                .ok_or_else(|| syntax(line, "expected chars, words, items or lines"))?;
            Ok(Expr::Count {
                granularity,
                of: Box::new(parse_expr(of, line)?),
            })
        }
        _ => Err(syntax(line, "expected (number words expr)")),
    }
}

/// Parse `(word 2 [to 3] of X)`, folding nested chunk forms in `X` into the
/// chunk's `of` chain. Returns the chunk and the innermost non-chunk form.
fn parse_chunk(items: &[Form], line: usize) -> ScriptResult<(ChunkExpr, &Form)> {
    let granularity = items[0]
        .as_symbol()
        .and_then(Granularity::from_keyword)
        .ok_or_else(|| syntax(line, "expected a chunk type"))?;
    let start = parse_ordinal_expr(&items[1], line)?;
    let (end, rest) = if items.get(2).is_some_and(|form| form.is_symbol("to")) {
        let end = items
            .get(3)
            .ok_or_else(|| syntax(line, "expected an end position after 'to'"))?;
        (Some(parse_ordinal_expr(end, line)?), &items[4..])
    } else {
        (None, &items[2..])
    };
    let base = match rest {
        [of, base] if of.is_symbol("of") => base,
        _ => return Err(syntax(line, format!("expected ({} n of value)", granularity))),
    };
    let mut chunk = ChunkExpr {
        granularity,
        start,
        end,
        of: None,
    };
    if let Form::List { items: inner, line } = base {
        if is_chunk_form(inner) {
            let (outer, base) = parse_chunk(inner, *line)?;
            chunk.of = Some(Box::new(outer));
            return Ok((chunk, base));
        }
    }
    Ok((chunk, base))
}

fn is_chunk_form(items: &[Form]) -> bool {
    items.len() >= 4
        && items[0]
            .as_symbol()
            .and_then(Granularity::from_keyword)
            .is_some()
}

fn ordinal_word(word: &str) -> Option<Ordinal> {
    let number = match word.to_ascii_lowercase().as_str() {
        "last" => return Some(Ordinal::Last),
        "middle" | "mid" => return Some(Ordinal::Middle),
        "any" => return Some(Ordinal::Any),
        "first" => 1,
        "second" => 2,
        "third" => 3,
        "fourth" => 4,
        "fifth" => 5,
        "sixth" => 6,
        "seventh" => 7,
        "eighth" => 8,
        "ninth" => 9,
        "tenth" => 10,
        _ => return None,
    };
    Ordinal::nth(number).ok()
}

fn parse_ordinal_expr(form: &Form, line: usize) -> ScriptResult<OrdinalExpr> {
    if let Some(ordinal) = form.as_symbol().and_then(ordinal_word) {
        return Ok(OrdinalExpr::Fixed(ordinal));
    }
    if let Form::Integer(num) = form {
        if let Ok(ordinal) = Ordinal::nth(*num) {
            return Ok(OrdinalExpr::Fixed(ordinal));
        }
    }
    // Everything else, including literal zero, is checked when evaluated.
    Ok(OrdinalExpr::Computed(Box::new(parse_expr(form, line)?)))
}

fn part_type_word(form: &Form) -> Option<PartType> {
    form.as_symbol()
        .and_then(PartType::from_keyword)
        .filter(|part_type| *part_type != PartType::MessageBox)
}

fn is_part_form(items: &[Form]) -> bool {
    match items {
        [head, ..] if head.is_symbol("msg") || head.is_symbol("message") => true,
        [head, next, ..] if head.is_symbol("this") => part_type_word(next).is_some(),
        [head, next, ..] if head.as_symbol().and_then(ordinal_word).is_some() => {
            part_type_word(next).is_some()
        }
        [head, ..] => part_type_word(head).is_some(),
        [] => false,
    }
}

/// Parse a part operand: `me`, `target`, or a part form.
fn parse_part(form: &Form, line: usize) -> ScriptResult<PartRef> {
    match form {
        Form::Symbol(symbol) if symbol.eq_ignore_ascii_case("me") => Ok(PartRef::Me),
        Form::Symbol(symbol) if symbol.eq_ignore_ascii_case("target") => Ok(PartRef::Target),
        Form::Symbol(symbol) if symbol.eq_ignore_ascii_case("msg") => Ok(PartRef::MessageBox),
        Form::List { items, line } if is_part_form(items) => parse_part_items(items, *line),
        Form::List { items, .. }
            if items.len() == 2 && items[0].is_symbol("the") && items[1].is_symbol("target") =>
        {
            Ok(PartRef::Target)
        }
        _ => Err(syntax(line, "expected a part reference")),
    }
}

fn parse_part_items(items: &[Form], line: usize) -> ScriptResult<PartRef> {
    let head = &items[0];
    if head.is_symbol("msg") || head.is_symbol("message") {
        return Ok(PartRef::MessageBox);
    }
    if head.is_symbol("this") {
        let part_type = part_type_word(&items[1]).ok_or_else(|| syntax(line, "expected (this card)"))?;
        return Ok(PartRef::This(part_type));
    }

    // Split off a trailing `of container`.
    let (items, container) = match items {
        [rest @ .., of, container] if of.is_symbol("of") && !rest.is_empty() => {
            (rest, Some(parse_part(container, line)?))
        }
        _ => (items, None),
    };

    // Layer: a `:card`/`:bg` keyword anywhere, or a `card`/`bkgnd` prefix on a
    // button or field.
    let mut owner = None;
    let mut words: Vec<&Form> = Vec::new();
    for item in items {
        match item {
            Form::Keyword(keyword) => {
                owner = Some(owner_keyword(keyword).ok_or_else(|| {
                    syntax(line, format!("unknown part layer :{}", keyword))
                })?);
            }
            other => words.push(other),
        }
    }
    // `last card`, `any bkgnd field`
    let ordinal = words
        .first()
        .and_then(|word| word.as_symbol())
        .and_then(ordinal_word);
    if ordinal.is_some() {
        words.remove(0);
    }
    if let [layer, kind, ..] = words.as_slice() {
        let layered = part_type_word(kind).is_some_and(|ty| ty.is_layered());
        match part_type_word(layer) {
            Some(PartType::Card) if layered => {
                owner = Some(Owner::Card);
                words.remove(0);
            }
            Some(PartType::Background) if layered => {
                owner = Some(Owner::Background);
                words.remove(0);
            }
            _ => {}
        }
    }

    let part = match words.as_slice() {
        [kind, rest @ ..] => {
            let part_type = part_type_word(kind).ok_or_else(|| syntax(line, "expected a part type"))?;
            if let Some(ordinal) = ordinal {
                if !rest.is_empty() {
                    return Err(syntax(line, format!("malformed {} reference", part_type.keyword())));
                }
                return Ok(wrap_container(
                    PartRef::Ordinal {
                        part_type,
                        owner,
                        ordinal,
                    },
                    container,
                ));
            }
            match rest {
                [] if !part_type.is_layered() => PartRef::This(part_type),
                [id, value] if id.is_symbol("id") => PartRef::Id {
                    part_type,
                    owner,
                    id: parse_expr(value, line)?,
                },
                [selector] => match selector.as_symbol().and_then(ordinal_word) {
                    Some(ordinal) => PartRef::Ordinal {
                        part_type,
                        owner,
                        ordinal,
                    },
                    None => PartRef::Lookup {
                        part_type,
                        owner,
                        key: parse_expr(selector, line)?,
                    },
                },
                _ => return Err(syntax(line, format!("malformed {} reference", part_type.keyword()))),
            }
        }
        [] => return Err(syntax(line, "empty part reference")),
    };

    Ok(wrap_container(part, container))
}

fn wrap_container(part: PartRef, container: Option<PartRef>) -> PartRef {
    match container {
        Some(container) => PartRef::Of {
            part: Box::new(part),
            container: Box::new(container),
        },
        None => part,
    }
}

fn owner_keyword(keyword: &str) -> Option<Owner> {
    match keyword.to_ascii_lowercase().as_str() {
        "card" | "cd" => Some(Owner::Card),
        "bg" | "bkgnd" | "background" => Some(Owner::Background),
        _ => None,
    }
}

fn parse_container(form: &Form, line: usize) -> ScriptResult<ContainerRef> {
    match form {
        Form::Symbol(symbol) if symbol.eq_ignore_ascii_case("it") => Ok(ContainerRef::It),
        Form::Symbol(symbol) if symbol.eq_ignore_ascii_case("me") => Ok(ContainerRef::Part(PartRef::Me)),
        Form::Symbol(symbol) if symbol.eq_ignore_ascii_case("msg") => Ok(ContainerRef::MessageBox),
        Form::Symbol(symbol) => Ok(ContainerRef::Variable(symbol.clone())),
        Form::List { items, line } if is_chunk_form(items) => {
            let (chunk, base) = parse_chunk(items, *line)?;
            Ok(ContainerRef::Chunk {
                chunk,
                container: Box::new(parse_container(base, *line)?),
            })
        }
        Form::List { items, line } if is_part_form(items) => match parse_part_items(items, *line)? {
            PartRef::MessageBox => Ok(ContainerRef::MessageBox),
            part => Ok(ContainerRef::Part(part)),
        },
        _ => Err(syntax(line, "expected a variable, part or chunk to put into")),
    }
}

fn expect_list<'f>(form: &'f Form, line: usize, what: &str) -> ScriptResult<(&'f [Form], usize)> {
    match form {
        Form::List { items, line } => Ok((items, *line)),
        _ => Err(syntax(line, format!("{} must be a list", what))),
    }
}

fn expect_symbol(form: &Form, line: usize) -> ScriptResult<&str> {
    form.as_symbol()
        .ok_or_else(|| syntax(line, format!("expected symbol, found {:?}", form)))
}

fn expect_arity(args: &[Form], count: usize, line: usize, what: &str) -> ScriptResult<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(syntax(
            line,
            format!("{} expects {} argument(s), found {}", what, count, args.len()),
        ))
    }
}

fn syntax(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Syntax {
        message: message.into(),
        line: (line > 0).then_some(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::parser::parse_script;

    fn compile(src: &str) -> Script {
        build_script(&parse_script(src).expect("parse")).expect("build")
    }

    fn body(src: &str) -> Vec<Statement> {
        let script = compile(&format!("(on test ()\n{}\n)", src));
        script.handler("TEST").expect("handler").body.clone()
    }

    #[test]
    fn handlers_and_functions_are_case_insensitive() {
        let script = compile(
            "(on mouseUp () (beep))\n(function Double (n) (return (* n 2)))\n(on MOUSEUP () (pass))",
        );
        let handler = script.handler("mouseup").unwrap();
        assert_eq!(handler.name, "mouseUp");
        assert_eq!(
            handler.body[0].kind,
            StatementKind::Command {
                name: "beep".into(),
                args: vec![]
            }
        );
        assert_eq!(script.function("double").unwrap().params, vec!["n".to_string()]);
    }

    #[test]
    fn nested_chunks_fold_into_one_chunk() {
        let stmts = body("(put \"x\" into (char 2 of (word 3 of (field \"notes\"))))");
        let StatementKind::Put { destination, .. } = &stmts[0].kind else {
            panic!("expected put");
        };
        let Some(ContainerRef::Chunk { chunk, container }) = destination else {
            panic!("expected chunk container");
        };
        assert_eq!(chunk.granularity, Granularity::Character);
        assert_eq!(chunk.of.as_ref().unwrap().granularity, Granularity::Word);
        assert!(matches!(**container, ContainerRef::Part(PartRef::Lookup { .. })));
    }

    #[test]
    fn part_references() {
        let stmts = body(
            "(set hilite of (card button 2 of (card 3)) to true)\n(send \"mouseUp\" to (last bkgnd field))\n(get (field 1 :bg))",
        );
        let StatementKind::Set { part: Some(PartRef::Of { part, container }), .. } = &stmts[0].kind else {
            panic!("expected composite set");
        };
        assert!(matches!(
            **part,
            PartRef::Lookup {
                part_type: PartType::Button,
                owner: Some(Owner::Card),
                ..
            }
        ));
        assert!(matches!(**container, PartRef::Lookup { part_type: PartType::Card, .. }));
        assert!(matches!(
            &stmts[1].kind,
            StatementKind::Send {
                to: Some(PartRef::Ordinal {
                    ordinal: Ordinal::Last,
                    owner: Some(Owner::Background),
                    ..
                }),
                ..
            }
        ));
        assert!(matches!(
            &stmts[2].kind,
            StatementKind::Get(Expr::Part(part)) if matches!(**part, PartRef::Lookup { owner: Some(Owner::Background), .. })
        ));
    }

    #[test]
    fn statements_carry_their_lines() {
        let stmts = body("(put 1 into x)\n(do\n (put 2 into y)\n (put 3 into z))");
        let lines: Vec<_> = stmts.iter().map(|stmt| stmt.line).collect();
        assert_eq!(lines, vec![2, 4, 5]);
    }

    #[test]
    fn property_forms() {
        let stmts = body("(get (the long name of me))\n(set itemDelimiter to \";\")");
        assert!(matches!(
            &stmts[0].kind,
            StatementKind::Get(Expr::Property {
                adjective: Some(Adjective::Long),
                part: Some(_),
                ..
            })
        ));
        assert!(matches!(&stmts[1].kind, StatementKind::Set { part: None, .. }));
    }

    #[test]
    fn syntax_errors_report_lines() {
        let err = build_script(&parse_script("(on a ()\n (put))").unwrap()).unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: Some(2), .. }));
        let err = build_script(&parse_script("(handler a)").unwrap()).unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: Some(1), .. }));
    }
}

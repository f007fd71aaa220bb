use std::collections::BTreeMap;

use razor::{Instruction, Program, ValueTable};

use crate::builtins;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::runtime_value::{RuntimeValue, format_number};
use crate::script::ast::{
    AssignOperator, BinaryOperator, Expr, LogicalOperator, Stmt, TemplatePart, UnaryOperator,
};
use crate::script::lexer::{Token, tokenize};
use crate::script::{parse_expression, parse_program};

const MAX_DEPTH: usize = 256;

/// Assigning past this index is an error rather than an allocation.
const MAX_ARRAY_LENGTH: usize = 1 << 16;

/// The primitives a running template uses to produce output.
pub trait Host {
    /// The data model the template was compiled with.
    fn model(&self) -> &RuntimeValue;

    /// Write text verbatim to the active section or the main output.
    fn write_raw(&mut self, text: &str);

    /// Write a value using the encoding rule: empty values write nothing,
    /// numbers, booleans and markup are written as is, everything else is
    /// converted to text and escaped.
    fn write_encoded(&mut self, value: &RuntimeValue);

    /// Open the named section, or close it when it is the active one.
    fn section_marker(&mut self, name: &str) -> Result<(), RuntimeError>;

    /// Rendered markup of the content template, inside a layout.
    fn body(&self) -> Option<&str>;

    /// Consume a captured section.
    fn read_section(&mut self, name: &str, required: bool) -> Result<RuntimeValue, RuntimeError>;

    /// Render a partial view in place. `None` renders it with the current model.
    fn partial(&mut self, name: &str, model: Option<RuntimeValue>) -> Result<(), RuntimeError>;

    fn layout(&self) -> Option<&str>;

    fn set_layout(&mut self, layout: Option<String>);
}

/// Runs the embedded code of a generated program against a [`Host`].
pub trait Evaluator {
    fn execute(&self, program: &Program, host: &mut dyn Host) -> Result<(), RuntimeError>;
}

/// The built-in evaluator for the JavaScript-flavoured embedded language.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl Evaluator for ScriptEvaluator {
    fn execute(&self, program: &Program, host: &mut dyn Host) -> Result<(), RuntimeError> {
        let statements = parse_program(linearize(program)?)?;
        log::debug!("executing {} top-level statements", statements.len());

        let mut env = Environment::new();
        env.declare("Model", host.model().clone());
        env.declare("Html", RuntimeValue::Host);

        let mut interpreter = Interpreter {
            env,
            host,
            values: &program.values,
        };
        for statement in &statements {
            match interpreter.execute(statement, 0)? {
                Flow::Normal => {}
                Flow::Break => return Err(RuntimeError::StrayJump("break")),
                Flow::Continue => return Err(RuntimeError::StrayJump("continue")),
            }
        }
        Ok(())
    }
}

/// Turn a program into one token stream. Statement text is tokenized in
/// place; the other instructions become directive tokens, so a control
/// statement split across instructions parses as a whole.
pub fn linearize(program: &Program) -> Result<Vec<Token>, RuntimeError> {
    let mut tokens = Vec::new();
    for instruction in &program.instructions {
        match instruction {
            Instruction::EmitLiteral(index) => tokens.push(Token::EmitLiteral(*index)),
            Instruction::EmitEvaluatedExpression(index) => {
                let text = value_text(&program.values, *index)?;
                tokens.push(Token::EmitExpression(Box::new(parse_expression(text)?)));
            }
            Instruction::ExecuteStatement(text) => tokenize(text, &mut tokens)?,
            Instruction::SectionMarker(name) => tokens.push(Token::SectionMarker(name.clone())),
        }
    }
    Ok(tokens)
}

fn value_text(values: &ValueTable, index: usize) -> Result<&str, RuntimeError> {
    values
        .get(index)
        .ok_or_else(|| RuntimeError::Custom(format!("value #{} is missing from the table", index)))
}

enum Flow {
    Normal,
    Break,
    Continue,
}

/// One step of an assignment path below a variable.
enum Key {
    Name(String),
    Index(RuntimeValue),
}

struct Interpreter<'h> {
    env: Environment,
    host: &'h mut dyn Host,
    values: &'h ValueTable,
}

impl Interpreter<'_> {
    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn execute(&mut self, stmt: &Stmt, depth: usize) -> Result<Flow, RuntimeError> {
        if depth > MAX_DEPTH {
            return Err(RuntimeError::StackOverflow);
        }

        match stmt {
            Stmt::Empty => {}
            Stmt::Expr(expr) => {
                self.evaluate(expr, depth + 1)?;
            }
            Stmt::Declare {
                template_scoped,
                declarations,
            } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => self.evaluate(expr, depth + 1)?,
                        None => RuntimeValue::Undefined,
                    };
                    if *template_scoped {
                        self.env.declare_global(name, value);
                    } else {
                        self.env.declare(name, value);
                    }
                }
            }

            // --- Directives ---
            Stmt::EmitLiteral(index) => {
                let text = value_text(self.values, *index)?;
                self.host.write_raw(text);
            }
            Stmt::EmitExpression(expr) => {
                let value = self.evaluate(expr, depth + 1)?;
                self.host.write_encoded(&value);
            }
            Stmt::SectionMarker(name) => self.host.section_marker(name)?,

            // --- Control flow ---
            Stmt::Block(statements) => {
                self.env.push_scope();
                let flow = self.execute_all(statements, depth);
                self.env.pop_scope();
                return flow;
            }
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition, depth + 1)?.is_truthy() {
                    return self.execute(then, depth + 1);
                } else if let Some(otherwise) = otherwise {
                    return self.execute(otherwise, depth + 1);
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition, depth + 1)?.is_truthy() {
                    if let Flow::Break = self.execute(body, depth + 1)? {
                        break;
                    }
                }
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                self.env.push_scope();
                let result = self.execute_for(
                    init.as_deref(),
                    condition.as_ref(),
                    update.as_ref(),
                    body,
                    depth,
                );
                self.env.pop_scope();
                result?;
            }
            Stmt::ForOf {
                name,
                iterable,
                body,
            } => {
                let items = match self.evaluate(iterable, depth + 1)? {
                    RuntimeValue::Array(items) => items,
                    RuntimeValue::String(s) | RuntimeValue::Html(s) => {
                        s.chars().map(|c| RuntimeValue::String(c.to_string())).collect()
                    }
                    other => {
                        return Err(RuntimeError::TypeError {
                            expected: "an iterable".to_string(),
                            got: other.type_name().to_string(),
                        });
                    }
                };
                self.execute_each(name, items, body, depth)?;
            }
            Stmt::ForIn { name, object, body } => {
                let keys = match self.evaluate(object, depth + 1)? {
                    RuntimeValue::Object(map) => {
                        map.into_keys().map(RuntimeValue::String).collect()
                    }
                    RuntimeValue::Array(items) => (0..items.len())
                        .map(|i| RuntimeValue::String(i.to_string()))
                        .collect(),
                    RuntimeValue::String(s) | RuntimeValue::Html(s) => (0..s.chars().count())
                        .map(|i| RuntimeValue::String(i.to_string()))
                        .collect(),
                    _ => Vec::new(),
                };
                self.execute_each(name, keys, body, depth)?;
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn execute_all(&mut self, statements: &[Stmt], depth: usize) -> Result<Flow, RuntimeError> {
        for statement in statements {
            match self.execute(statement, depth + 1)? {
                Flow::Normal => {}
                jump => return Ok(jump),
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        depth: usize,
    ) -> Result<(), RuntimeError> {
        if let Some(init) = init {
            self.execute(init, depth + 1)?;
        }
        loop {
            if let Some(condition) = condition {
                if self.evaluate(condition, depth + 1)?.is_falsy() {
                    break;
                }
            }
            if let Flow::Break = self.execute(body, depth + 1)? {
                break;
            }
            if let Some(update) = update {
                self.evaluate(update, depth + 1)?;
            }
        }
        Ok(())
    }

    /// Run `body` once per item with `name` bound in a fresh scope.
    fn execute_each(
        &mut self,
        name: &str,
        items: Vec<RuntimeValue>,
        body: &Stmt,
        depth: usize,
    ) -> Result<(), RuntimeError> {
        for item in items {
            self.env.push_scope();
            self.env.declare(name, item);
            let flow = self.execute(body, depth + 1);
            self.env.pop_scope();
            if let Flow::Break = flow? {
                break;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn evaluate(&mut self, expr: &Expr, depth: usize) -> Result<RuntimeValue, RuntimeError> {
        if depth > MAX_DEPTH {
            return Err(RuntimeError::StackOverflow);
        }

        match expr {
            // --- Literals ---
            Expr::Number(n) => Ok(RuntimeValue::Number(*n)),
            Expr::Str(s) => Ok(RuntimeValue::String(s.clone())),
            Expr::Boolean(b) => Ok(RuntimeValue::Boolean(*b)),
            Expr::Null => Ok(RuntimeValue::Null),
            Expr::Undefined => Ok(RuntimeValue::Undefined),
            Expr::Template(parts) => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(s) => result.push_str(s),
                        TemplatePart::Expr(expr) => {
                            result.push_str(&self.evaluate(expr, depth + 1)?.to_string())
                        }
                    }
                }
                Ok(RuntimeValue::String(result))
            }
            Expr::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.evaluate(item, depth + 1))
                    .collect::<Result<_, _>>()?;
                Ok(RuntimeValue::Array(items))
            }
            Expr::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.evaluate(value, depth + 1)?);
                }
                Ok(RuntimeValue::Object(map))
            }

            // --- References ---
            Expr::Ident(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone())),
            Expr::Member { object, property } => {
                let object = self.evaluate(object, depth + 1)?;
                self.member(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.evaluate(object, depth + 1)?;
                let index = self.evaluate(index, depth + 1)?;
                self.member(&object, &index.to_string())
            }
            Expr::Call { callee, args } => self.call(callee, args, depth),

            // --- Operations ---
            Expr::Unary { operator, operand } => {
                if let (UnaryOperator::Typeof, Expr::Ident(name)) = (operator, operand.as_ref()) {
                    let type_of = self.env.get(name).map_or("undefined", RuntimeValue::type_of);
                    return Ok(RuntimeValue::String(type_of.to_string()));
                }
                let value = self.evaluate(operand, depth + 1)?;
                Ok(match operator {
                    UnaryOperator::Not => RuntimeValue::Boolean(value.is_falsy()),
                    UnaryOperator::Negate => RuntimeValue::Number(-value.to_number()),
                    UnaryOperator::Plus => RuntimeValue::Number(value.to_number()),
                    UnaryOperator::Typeof => RuntimeValue::String(value.type_of().to_string()),
                })
            }
            Expr::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left, depth + 1)?;
                let right = self.evaluate(right, depth + 1)?;
                eval_binary_op(*operator, &left, &right)
            }
            Expr::Logical {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left, depth + 1)?;
                let short_circuit = match operator {
                    LogicalOperator::And => left.is_falsy(),
                    LogicalOperator::Or => left.is_truthy(),
                    LogicalOperator::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right, depth + 1)
                }
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition, depth + 1)?.is_truthy() {
                    self.evaluate(then, depth + 1)
                } else {
                    self.evaluate(otherwise, depth + 1)
                }
            }

            // --- Mutation ---
            Expr::Assign {
                target,
                operator,
                value,
            } => {
                let value = self.evaluate(value, depth + 1)?;
                let value = match operator {
                    AssignOperator::Assign => value,
                    AssignOperator::Add => {
                        let current = self.evaluate(target, depth + 1)?;
                        eval_binary_op(BinaryOperator::Add, &current, &value)?
                    }
                    AssignOperator::Subtract => {
                        let current = self.evaluate(target, depth + 1)?;
                        eval_binary_op(BinaryOperator::Subtract, &current, &value)?
                    }
                };
                self.assign(target, value.clone(), depth)?;
                Ok(value)
            }
            Expr::Update {
                target,
                increment,
                prefix,
            } => {
                let old = self.evaluate(target, depth + 1)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign(target, RuntimeValue::Number(new), depth)?;
                Ok(RuntimeValue::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn member(&self, object: &RuntimeValue, property: &str) -> Result<RuntimeValue, RuntimeError> {
        match object {
            RuntimeValue::Undefined | RuntimeValue::Null => Err(RuntimeError::UndefinedProperty {
                target: object.type_name().to_string(),
                property: property.to_string(),
            }),
            RuntimeValue::Host if property == "layout" => Ok(self
                .host
                .layout()
                .map_or(RuntimeValue::Null, RuntimeValue::from)),
            _ => Ok(object.property(property).unwrap_or_default()),
        }
    }

    fn call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        depth: usize,
    ) -> Result<RuntimeValue, RuntimeError> {
        let (receiver, method) = match callee {
            Expr::Member { object, property } => {
                (self.evaluate(object, depth + 1)?, property.as_str())
            }
            Expr::Ident(name) => return Err(RuntimeError::NotCallable(name.clone())),
            _ => return Err(RuntimeError::NotCallable("expression".to_string())),
        };
        let args = args
            .iter()
            .map(|arg| self.evaluate(arg, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;

        match receiver {
            RuntimeValue::Host => self.call_html(method, args),
            RuntimeValue::Object(ref map) if map.contains_key(method) => {
                Err(RuntimeError::NotCallable(method.to_string()))
            }
            _ => builtins::call_method(&receiver, method, &args),
        }
    }

    /// Methods of the `Html` object.
    fn call_html(
        &mut self,
        method: &str,
        args: Vec<RuntimeValue>,
    ) -> Result<RuntimeValue, RuntimeError> {
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or_default();

        match method {
            "raw" => {
                let value = next();
                if !value.is_nullish() {
                    self.host.write_raw(&value.to_string());
                }
                Ok(RuntimeValue::Undefined)
            }
            "encode" => {
                self.host.write_encoded(&next());
                Ok(RuntimeValue::Undefined)
            }
            "body" => Ok(RuntimeValue::Html(
                self.host.body().unwrap_or_default().to_string(),
            )),
            "section" => {
                let name = next().to_string();
                let required = next().is_truthy();
                self.host.read_section(&name, required)
            }
            "partial" => {
                let name = next().to_string();
                let model = Some(next()).filter(|model| !model.is_nullish());
                self.host.partial(&name, model)?;
                Ok(RuntimeValue::String(String::new()))
            }
            _ => Err(RuntimeError::UnknownMethod {
                receiver: "Html".to_string(),
                method: method.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn assign(
        &mut self,
        target: &Expr,
        value: RuntimeValue,
        depth: usize,
    ) -> Result<(), RuntimeError> {
        if let Expr::Member { object, property } = target {
            if property == "layout"
                && matches!(self.evaluate(object, depth + 1)?, RuntimeValue::Host)
            {
                let layout = match value {
                    RuntimeValue::Undefined | RuntimeValue::Null => None,
                    other => Some(other.to_string()),
                };
                self.host.set_layout(layout);
                return Ok(());
            }
        }

        let mut keys = Vec::new();
        let root = self.place(target, &mut keys, depth)?;
        if keys.is_empty() {
            self.env.assign(&root, value);
            return Ok(());
        }

        let mut slot = self
            .env
            .get_mut(&root)
            .ok_or_else(|| RuntimeError::UndefinedVariable(root.clone()))?;
        for key in keys {
            slot = child_slot(slot, key)?;
        }
        *slot = value;
        Ok(())
    }

    /// Resolve an assignment target into its root variable and the keys below
    /// it, evaluating index expressions on the way.
    fn place(
        &mut self,
        target: &Expr,
        keys: &mut Vec<Key>,
        depth: usize,
    ) -> Result<String, RuntimeError> {
        match target {
            Expr::Ident(name) => Ok(name.clone()),
            Expr::Member { object, property } => {
                let root = self.place(object, keys, depth + 1)?;
                keys.push(Key::Name(property.clone()));
                Ok(root)
            }
            Expr::Index { object, index } => {
                let root = self.place(object, keys, depth + 1)?;
                keys.push(Key::Index(self.evaluate(index, depth + 1)?));
                Ok(root)
            }
            _ => Err(RuntimeError::InvalidAssignment),
        }
    }
}

fn child_slot(slot: &mut RuntimeValue, key: Key) -> Result<&mut RuntimeValue, RuntimeError> {
    let index = array_index(slot, &key)?;
    match (slot, key, index) {
        (RuntimeValue::Array(items), _, Some(index)) => {
            if index >= items.len() {
                items.resize(index + 1, RuntimeValue::Undefined);
            }
            Ok(&mut items[index])
        }
        (RuntimeValue::Object(map), key, _) => {
            let name = match key {
                Key::Name(name) => name,
                Key::Index(value) => value.to_string(),
            };
            Ok(map.entry(name).or_default())
        }
        (other, key, _) => Err(RuntimeError::TypeError {
            expected: "an object or array".to_string(),
            got: match key {
                Key::Name(name) => format!("{} (setting '{}')", other.type_name(), name),
                Key::Index(index) => format!("{} (setting [{}])", other.type_name(), index),
            },
        }),
    }
}

/// The element written when an array is indexed by a whole number.
fn array_index(slot: &RuntimeValue, key: &Key) -> Result<Option<usize>, RuntimeError> {
    let (RuntimeValue::Array(_), Key::Index(RuntimeValue::Number(n))) = (slot, key) else {
        return Ok(None);
    };
    if *n < 0.0 || n.fract() != 0.0 {
        return Ok(None);
    }
    if *n >= MAX_ARRAY_LENGTH as f64 {
        return Err(RuntimeError::IndexOutOfRange {
            index: format_number(*n),
            limit: MAX_ARRAY_LENGTH,
        });
    }
    Ok(Some(*n as usize))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn eval_binary_op(
    operator: BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    match operator {
        BinaryOperator::Add => {
            if is_textual(left) || is_textual(right) {
                Ok(RuntimeValue::String(format!("{}{}", left, right)))
            } else {
                numeric_binop(left, right, |a, b| a + b)
            }
        }
        BinaryOperator::Subtract => numeric_binop(left, right, |a, b| a - b),
        BinaryOperator::Multiply => numeric_binop(left, right, |a, b| a * b),
        BinaryOperator::Divide => {
            let b = right.to_number();
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(RuntimeValue::Number(left.to_number() / b))
        }
        BinaryOperator::Modulo => {
            let b = right.to_number();
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(RuntimeValue::Number(left.to_number() % b))
        }
        BinaryOperator::Equal => Ok(RuntimeValue::Boolean(left.loose_eq(right))),
        BinaryOperator::NotEqual => Ok(RuntimeValue::Boolean(!left.loose_eq(right))),
        BinaryOperator::StrictEqual => Ok(RuntimeValue::Boolean(left == right)),
        BinaryOperator::StrictNotEqual => Ok(RuntimeValue::Boolean(left != right)),
        BinaryOperator::Less => compare(left, right, |a, b| a < b, |a, b| a < b),
        BinaryOperator::Greater => compare(left, right, |a, b| a > b, |a, b| a > b),
        BinaryOperator::LessOrEqual => compare(left, right, |a, b| a <= b, |a, b| a <= b),
        BinaryOperator::GreaterOrEqual => compare(left, right, |a, b| a >= b, |a, b| a >= b),
    }
}

/// Operands that turn `+` into concatenation.
fn is_textual(value: &RuntimeValue) -> bool {
    matches!(
        value,
        RuntimeValue::String(_)
            | RuntimeValue::Html(_)
            | RuntimeValue::Array(_)
            | RuntimeValue::Object(_)
            | RuntimeValue::Host
    )
}

fn numeric_binop(
    left: &RuntimeValue,
    right: &RuntimeValue,
    f: impl Fn(f64, f64) -> f64,
) -> Result<RuntimeValue, RuntimeError> {
    Ok(RuntimeValue::Number(f(left.to_number(), right.to_number())))
}

/// Strings compare lexically, everything else numerically.
fn compare(
    left: &RuntimeValue,
    right: &RuntimeValue,
    numeric: impl Fn(f64, f64) -> bool,
    lexical: impl Fn(&str, &str) -> bool,
) -> Result<RuntimeValue, RuntimeError> {
    let result = match (left, right) {
        (RuntimeValue::String(a), RuntimeValue::String(b)) => lexical(a.as_str(), b.as_str()),
        _ => numeric(left.to_number(), right.to_number()),
    };
    Ok(RuntimeValue::Boolean(result))
}

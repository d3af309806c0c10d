//! Expression parser: `[tie][.prop.path][|pipe[:arg, ...]]*`.
//!
//! ```text
//! user.name|uppercase
//! .title|default:'untitled'
//! cart|total:#{currency},[1, 2],{round: true}
//! ```
//!
//! A leading `.` addresses the context tie. Pipe arguments are quoted
//! strings, `#{path}` references into the tie's model, `[...]` lists,
//! `{key: value}` objects, or bare words coerced with `Value::coerce`.
//! Bare words run to the next `,` or `|`, so `10:30` needs no quotes.

use crate::model::Model;
use crate::value::Value;
use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::prelude::*;
use std::fmt;
use std::ops::Range;

type Extra<'src> = extra::Err<Rich<'src, char>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// `None` for the `.prop` shorthand on the context tie.
    pub tie: Option<String>,
    pub property: Option<String>,
    pub pipes: Vec<PipeInvocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipeInvocation {
    pub name: String,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Literal(Value),
    /// `#{path}`, read from the model at evaluation time.
    Reference(String),
    List(Vec<Argument>),
    Object(Vec<(String, Argument)>),
}

impl Argument {
    /// Produce the argument value. References without a model are null.
    pub fn resolve(&self, model: Option<&Model>) -> Value {
        match self {
            Argument::Literal(value) => value.clone(),
            Argument::Reference(path) => model
                .and_then(|model| model.get(path))
                .cloned()
                .unwrap_or_default(),
            Argument::List(items) => Value::list(items.iter().map(|item| item.resolve(model))),
            Argument::Object(fields) => Value::object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.resolve(model))),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    pub span: Range<usize>,
    pub message: String,
    pub reason: String,
}

/// Parse errors for one input, renderable as an ariadne report.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    input: String,
    issues: Vec<ParseIssue>,
}

impl ParseFailure {
    fn new(input: &str, errors: Vec<Rich<'_, char>>) -> Self {
        let issues = errors
            .into_iter()
            .map(|error| ParseIssue {
                span: error.span().into_range(),
                message: error.to_string(),
                reason: error.reason().to_string(),
            })
            .collect();
        Self {
            input: input.to_owned(),
            issues,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    /// Render every issue as a colorless ariadne report.
    pub fn report(&self, filename: &str) -> String {
        let mut output = String::new();
        for issue in &self.issues {
            let mut buffer = Vec::new();
            let written = Report::build(ReportKind::Error, (filename, issue.span.clone()))
                .with_config(Config::default().with_color(false))
                .with_message(&issue.message)
                .with_label(Label::new((filename, issue.span.clone())).with_message(&issue.reason))
                .finish()
                .write((filename, Source::from(self.input.as_str())), &mut buffer);
            if written.is_ok() {
                output.push_str(&String::from_utf8_lossy(&buffer));
            }
        }
        output
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse expression '{}'", self.input)?;
        if let Some(first) = self.issues.first() {
            write!(f, " at {}..{}: {}", first.span.start, first.span.end, first.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseFailure {}

pub fn parse_expression(source: &str) -> Result<Expression, ParseFailure> {
    expression()
        .parse(source)
        .into_result()
        .map_err(|errors| ParseFailure::new(source, errors))
}

/// Parse a bare, comma-separated argument list (the text after `pipe:`).
pub fn parse_arguments(source: &str) -> Result<Vec<Argument>, ParseFailure> {
    argument()
        .separated_by(just(','))
        .collect::<Vec<_>>()
        .then_ignore(end())
        .parse(source)
        .into_result()
        .map_err(|errors| ParseFailure::new(source, errors))
}

fn identifier<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|character: &char| {
            character.is_alphanumeric() || matches!(character, '_' | '-' | '$' | '@')
        })
        .repeated()
        .at_least(1)
        .to_slice()
}

fn quoted<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    choice((
        just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\'')),
        just('"')
            .ignore_then(none_of('"').repeated().to_slice())
            .then_ignore(just('"')),
    ))
}

fn argument<'src>() -> impl Parser<'src, &'src str, Argument, Extra<'src>> + Clone {
    recursive(|argument| {
        let reference = just("#{")
            .ignore_then(none_of('}').repeated().at_least(1).to_slice())
            .then_ignore(just('}'))
            .map(|path: &str| Argument::Reference(path.trim().to_owned()));

        let list = argument
            .clone()
            .separated_by(just(','))
            .allow_trailing()
            .collect::<Vec<_>>()
            .padded()
            .delimited_by(just('['), just(']'))
            .map(Argument::List);

        let field = quoted()
            .or(identifier())
            .padded()
            .then_ignore(just(':'))
            .then(argument)
            .map(|(key, value): (&str, Argument)| (key.to_owned(), value));

        let object = field
            .separated_by(just(','))
            .allow_trailing()
            .collect::<Vec<_>>()
            .padded()
            .delimited_by(just('{'), just('}'))
            .map(Argument::Object);

        let text = quoted().map(|text: &str| Argument::Literal(Value::from(text)));

        let bare = none_of(",|[]{}'\"")
            .repeated()
            .at_least(1)
            .to_slice()
            .map(|raw: &str| Argument::Literal(Value::coerce(raw)));

        choice((reference, list, object, text, bare)).padded()
    })
}

fn expression<'src>() -> impl Parser<'src, &'src str, Expression, Extra<'src>> {
    let path = identifier()
        .separated_by(just('.'))
        .at_least(1)
        .to_slice();

    let shorthand = just('.')
        .ignore_then(path.clone())
        .map(|property: &str| (None::<String>, Some(property.to_owned())));

    let addressed = identifier()
        .then(just('.').ignore_then(path).or_not())
        .map(|(tie, property): (&str, Option<&str>)| {
            (Some(tie.to_owned()), property.map(str::to_owned))
        });

    let arguments = just(':')
        .ignore_then(argument().separated_by(just(',')).collect::<Vec<_>>())
        .or_not()
        .map(Option::unwrap_or_default);

    let pipe = just('|')
        .ignore_then(identifier().padded())
        .then(arguments)
        .map(|(name, arguments): (&str, Vec<Argument>)| PipeInvocation {
            name: name.to_owned(),
            arguments,
        });

    choice((shorthand, addressed))
        .padded()
        .then(pipe.repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|((tie, property), pipes)| Expression {
            tie,
            property,
            pipes,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_property_and_pipe() {
        let expression = parse_expression("user.name|uppercase").unwrap();
        assert_eq!(expression.tie.as_deref(), Some("user"));
        assert_eq!(expression.property.as_deref(), Some("name"));
        assert_eq!(expression.pipes.len(), 1);
        assert_eq!(expression.pipes[0].name, "uppercase");
        assert!(expression.pipes[0].arguments.is_empty());
    }

    #[test]
    fn context_shorthand() {
        let expression = parse_expression(".address.city|default:'nowhere'").unwrap();
        assert_eq!(expression.tie, None);
        assert_eq!(expression.property.as_deref(), Some("address.city"));
        assert_eq!(
            expression.pipes[0].arguments,
            vec![Argument::Literal(Value::from("nowhere"))]
        );
    }

    #[test]
    fn bare_arguments_are_coerced() {
        let expression = parse_expression("cart|pick: 2, true, null, hello world").unwrap();
        assert_eq!(
            expression.pipes[0].arguments,
            vec![
                Argument::Literal(Value::from(2)),
                Argument::Literal(Value::Bool(true)),
                Argument::Literal(Value::Null),
                Argument::Literal(Value::from("hello world")),
            ]
        );
    }

    #[test]
    fn bare_words_may_contain_colons() {
        let expression = parse_expression("event.start|at:10:30, {from: 08:00}").unwrap();
        assert_eq!(
            expression.pipes[0].arguments,
            vec![
                Argument::Literal(Value::from("10:30")),
                Argument::Object(vec![("from".into(), Argument::Literal(Value::from("08:00")))]),
            ]
        );
    }

    #[test]
    fn structured_arguments() {
        let expression =
            parse_expression("cart|total:#{currency},[1, 'two'],{round: true, 'label': x}|json")
                .unwrap();
        assert_eq!(expression.pipes.len(), 2);
        assert_eq!(
            expression.pipes[0].arguments,
            vec![
                Argument::Reference("currency".into()),
                Argument::List(vec![
                    Argument::Literal(Value::from(1)),
                    Argument::Literal(Value::from("two")),
                ]),
                Argument::Object(vec![
                    ("round".into(), Argument::Literal(Value::Bool(true))),
                    ("label".into(), Argument::Literal(Value::from("x"))),
                ]),
            ]
        );
        assert_eq!(expression.pipes[1].name, "json");
    }

    #[test]
    fn references_resolve_against_the_model() {
        let mut model = Model::new();
        model.set("currency", Value::from("EUR"));
        let arguments = parse_arguments("#{currency}, #{missing}, 3").unwrap();
        let values: Vec<Value> = arguments
            .iter()
            .map(|argument| argument.resolve(Some(&model)))
            .collect();
        assert_eq!(values, vec![Value::from("EUR"), Value::Null, Value::from(3)]);
        assert!(parse_arguments("").unwrap().is_empty());
    }

    #[test]
    fn malformed_expressions_report_spans() {
        let failure = parse_expression("user|").unwrap_err();
        assert_eq!(failure.input(), "user|");
        assert!(!failure.issues().is_empty());
        assert!(failure.issues()[0].span.start >= 4);

        let report = failure.report("expression");
        assert!(report.contains("Error"));

        assert!(parse_expression("|upper").is_err());
        assert!(parse_expression("cart|total:'open").is_err());
    }
}

//! Compiled templates and the tree-walking evaluator.
//!
//! A [`Template`] is immutable once compiled and can be evaluated any number
//! of times, from any number of threads, each evaluation with its own
//! [`EvaluationContext`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, instrument, trace, warn};

use super::context::{EvaluationContext, StateObject};
use super::dialect::Dialect;
use super::directive::{DirectiveState, FlowDecision};
use super::error::{EvaluationError, TemplateError};
use super::interpreter::{interpret, DirectiveNode, Node};
use super::lexer::{LexComponent, Lexer, TagLex};
use super::tokenizer::tokenize;
use super::value::Value;

#[derive(Debug)]
struct Compiled {
    dialect: Arc<Dialect>,
    nodes: Vec<Node>,
}

/// A compiled template.  Cloning is cheap; clones share the tree.
#[derive(Debug, Clone)]
pub struct Template {
    inner: Arc<Compiled>,
}

impl Template {
    /// Tokenize, lex and interpret `source`.  Every structural and expression
    /// error surfaces here, before any evaluation.
    #[instrument(skip_all, fields(dialect = dialect.name(), bytes = source.len()))]
    pub fn compile(dialect: Arc<Dialect>, source: &str) -> Result<Template, TemplateError> {
        let tokens = tokenize(source, dialect.tag_start(), dialect.tag_end())?;
        let mut lexer = Lexer::new(&dialect, tokens);
        let nodes = interpret(&dialect, &mut lexer)?;
        debug!(nodes = nodes.len(), "template compiled");
        Ok(Template {
            inner: Arc::new(Compiled { dialect, nodes }),
        })
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.inner.dialect
    }

    /// A fresh context for this template's dialect.
    pub fn context(&self) -> EvaluationContext {
        EvaluationContext::new(Arc::clone(&self.inner.dialect))
    }

    /// Evaluate into `out`.  The context's frame stack is back at its
    /// starting depth when this returns, whatever the outcome.
    pub fn evaluate(
        &self,
        out: &mut dyn fmt::Write,
        ctx: &mut EvaluationContext,
    ) -> Result<(), TemplateError> {
        evaluate_nodes(&self.inner.nodes, out, ctx).map_err(TemplateError::from)
    }

    pub fn render(&self, ctx: &mut EvaluationContext) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.evaluate(&mut out, ctx)?;
        Ok(out)
    }

    /// Render on the blocking pool.  The context is handed back with the
    /// output so the caller can inspect it afterwards.
    pub async fn render_async(
        &self,
        mut ctx: EvaluationContext,
    ) -> Result<(String, EvaluationContext), TemplateError> {
        let template = self.clone();
        tokio::task::spawn_blocking(move || template.render(&mut ctx).map(|out| (out, ctx)))
        .await
        .map_err(|e| TemplateError::Worker(e.to_string()))?
    }
}

// ── Evaluation ────────────────────────────────────────────────────────────────

fn evaluate_nodes(
    nodes: &[Node],
    out: &mut dyn fmt::Write,
    ctx: &mut EvaluationContext,
) -> Result<(), EvaluationError> {
    for node in nodes {
        match node {
            Node::Unparsed { text, .. } => {
                ctx.check_cancelled()?;
                if ctx.dialect().collapse_whitespace()
                    && !ctx.contains_state_object(&StateObject::PREFORMATTED)
                {
                    out.write_str(&collapse(text))?;
                } else {
                    out.write_str(text)?;
                }
            }
            Node::Directive(d) => evaluate_directive(d, out, ctx)?,
        }
    }
    Ok(())
}

fn evaluate_directive(
    node: &DirectiveNode,
    out: &mut dyn fmt::Write,
    ctx: &mut EvaluationContext,
) -> Result<(), EvaluationError> {
    let scoped = node.tags.len() > 1;
    if scoped {
        ctx.open_frame();
    }
    let result = run_directive(node, out, ctx);
    if scoped {
        ctx.close_frame();
    }

    match result {
        Ok(()) => Ok(()),
        Err(e @ (EvaluationError::Cancelled | EvaluationError::Write(_))) => Err(e),
        Err(e) if ctx.options().ignore_evaluation_errors => {
            warn!(
                directive = node.directive.name(),
                position = node.position,
                error = %e,
                "directive failed, ignoring"
            );
            Ok(())
        }
        Err(e @ EvaluationError::Directive { .. }) => Err(e),
        Err(e) => Err(EvaluationError::Directive {
            directive: node.directive.name().to_owned(),
            position: node.position,
            source: Box::new(e),
        }),
    }
}

fn run_directive(
    node: &DirectiveNode,
    out: &mut dyn fmt::Write,
    ctx: &mut EvaluationContext,
) -> Result<(), EvaluationError> {
    let mut state = DirectiveState::Initial;
    let mut index = 0;
    while let Some(tag) = node.tags.get(index) {
        ctx.check_cancelled()?;
        let components = evaluate_components(tag, ctx)?;
        let (flow, emitted) = node.directive.execute(index, &components, &mut state, ctx)?;
        if let Some(text) = emitted {
            ctx.check_cancelled()?;
            out.write_str(&text)?;
        }
        trace!(directive = node.directive.name(), tag = index, ?flow);

        match flow {
            FlowDecision::Terminate => return Ok(()),
            FlowDecision::Restart => index = 0,
            // Evaluate on the last tag has no content to run and ends the
            // directive.
            FlowDecision::Evaluate => match node.bodies.get(index) {
                Some(body) => {
                    evaluate_nodes(body, out, ctx)?;
                    index += 1;
                }
                None => return Ok(()),
            },
            FlowDecision::Skip => index += 1,
        }
    }
    Ok(())
}

/// Placeholder values of a tag: identifier slots by name, expression slots
/// evaluated.
fn evaluate_components(
    tag: &TagLex,
    ctx: &mut EvaluationContext,
) -> Result<Vec<Value>, EvaluationError> {
    let mut values = Vec::new();
    for component in &tag.components {
        match component {
            LexComponent::Keyword(_) => {}
            LexComponent::Identifier(name) => values.push(Value::Str(name.clone())),
            LexComponent::Expression(expr) => values.push(expr.evaluate(ctx)?),
        }
    }
    Ok(values)
}

fn collapse(text: &str) -> String {
    static RUNS: OnceLock<Result<Regex, String>> = OnceLock::new();
    match RUNS.get_or_init(|| Regex::new(r"\s+").map_err(|e| e.to_string())) {
        Ok(re) => re.replace_all(text, " ").into_owned(),
        Err(_) => text.to_owned(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::context::EvaluationOptions;
    use crate::template::reflect::{list, Record};

    fn standard() -> Arc<Dialect> {
        Arc::new(Dialect::standard().unwrap())
    }

    fn render(src: &str, ctx: &mut EvaluationContext) -> Result<String, TemplateError> {
        Template::compile(standard(), src)?.render(ctx)
    }

    #[test]
    fn interpolation_and_text() {
        let mut ctx = EvaluationContext::new(standard()).with_self(Record::new().with("n", 3));
        assert_eq!(render("n={n}, n*2={n * 2}", &mut ctx).unwrap(), "n=3, n*2=6");
    }

    #[test]
    fn separated_loop() {
        let mut ctx = EvaluationContext::new(standard());
        ctx.set_variable("xs", list([1, 2, 3]));
        assert_eq!(
            render("{FOR EACH x IN xs}{x}{WITH}, {END}", &mut ctx).unwrap(),
            "1, 2, 3"
        );
        ctx.set_variable("xs", list(Vec::<Value>::new()));
        assert_eq!(render("[{FOR EACH x IN xs}{x}{WITH}, {END}]", &mut ctx).unwrap(), "[]");
    }

    #[test]
    fn repeat_and_set() {
        let mut ctx = EvaluationContext::new(standard());
        assert_eq!(
            render("{SET n TO 0}{REPEAT 3 TIMES}{SET n TO n + 1}{n}{END}|{n}", &mut ctx).unwrap(),
            "123|0"
        );
    }

    #[test]
    fn collapsing_respects_preformatted() {
        let dialect = Arc::new(
            Dialect::builder("collapsing")
                .standard_operators()
                .standard_directives()
                .collapse_whitespace(true)
                .build()
                .unwrap(),
        );
        let t = Template::compile(
            Arc::clone(&dialect),
            "a  \n b{PREFORMATTED}  c  \n{END}",
        )
        .unwrap();
        let mut ctx = t.context();
        assert_eq!(t.render(&mut ctx).unwrap(), "a b  c  \n");
    }

    #[test]
    fn errors_name_the_directive() {
        let mut ctx = EvaluationContext::new(standard()).with_options(EvaluationOptions {
            strict_identifiers: true,
            ..Default::default()
        });
        let err = render("ab{IF missing THEN}x{END}", &mut ctx).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Evaluation(EvaluationError::Directive {
                directive: "If".into(),
                position: 2,
                source: Box::new(EvaluationError::UndefinedIdentifier {
                    name: "missing".into()
                }),
            })
        );
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn nested_failures_are_wrapped_once() {
        let mut ctx = EvaluationContext::new(standard()).with_options(EvaluationOptions {
            strict_identifiers: true,
            ..Default::default()
        });
        let err = render("{IF true THEN}{nope}{END}", &mut ctx).unwrap_err();
        match err {
            TemplateError::Evaluation(EvaluationError::Directive {
                directive, source, ..
            }) => {
                assert_eq!(directive, "Interpolation");
                assert!(matches!(*source, EvaluationError::UndefinedIdentifier { .. }));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn ignored_errors_terminate_the_directive() {
        let mut ctx = EvaluationContext::new(standard()).with_options(EvaluationOptions {
            ignore_evaluation_errors: true,
            strict_identifiers: true,
            ..Default::default()
        });
        assert_eq!(render("a{nope}b{IF nope THEN}x{END}c", &mut ctx).unwrap(), "abc");
    }

    #[test]
    fn collapse_runs() {
        assert_eq!(collapse(" a \t\n b "), " a b ");
    }
}

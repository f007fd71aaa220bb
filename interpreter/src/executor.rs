use razor::{DEFAULT_FILE_PATH, ErrorKind, ParsedSectionRegistry, RazorError};

use crate::error::RuntimeError;
use crate::evaluator::{Evaluator, ScriptEvaluator};
use crate::html::HtmlContext;
use crate::resolver::{Completion, NoViews, TemplateResolver};
use crate::runtime_value::RuntimeValue;
use crate::sections::CapturedSections;

static SCRIPT_EVALUATOR: ScriptEvaluator = ScriptEvaluator;
static NO_VIEWS: NoViews = NoViews;

/// Inputs of one compile invocation.
pub struct CompileArgs<'a> {
    pub template: String,
    pub file_path: String,
    pub model: RuntimeValue,
    pub resolver: &'a dyn TemplateResolver,
    pub evaluator: &'a dyn Evaluator,
}

impl<'a> CompileArgs<'a> {
    /// Arguments with an undefined model, no views and the script evaluator.
    pub fn new(template: impl Into<String>) -> Self {
        CompileArgs {
            template: template.into(),
            file_path: DEFAULT_FILE_PATH.to_string(),
            model: RuntimeValue::Undefined,
            resolver: &NO_VIEWS,
            evaluator: &SCRIPT_EVALUATOR,
        }
    }

    pub fn file_path(mut self, file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        if !file_path.is_empty() {
            self.file_path = file_path;
        }
        self
    }

    pub fn model(mut self, model: impl Into<RuntimeValue>) -> Self {
        self.model = model.into();
        self
    }

    pub fn resolver(mut self, resolver: &'a dyn TemplateResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn evaluator(mut self, evaluator: &'a dyn Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    fn collaborators(&self) -> Collaborators<'a> {
        Collaborators {
            resolver: self.resolver,
            evaluator: self.evaluator,
        }
    }
}

/// State shared by a template, its partials and its layouts for the length
/// of one compile invocation.
#[derive(Debug, Default)]
pub struct Session {
    pub sections: CapturedSections,
    pub parsed: ParsedSectionRegistry,
}

#[derive(Clone, Copy)]
pub(crate) struct Collaborators<'a> {
    pub resolver: &'a dyn TemplateResolver,
    pub evaluator: &'a dyn Evaluator,
}

/// Output of a single template before layout composition.
pub(crate) struct Page {
    pub html: String,
    pub layout: Option<String>,
}

/// Compile and run a template, then wrap it in its layouts.
pub fn compile_sync(args: CompileArgs<'_>) -> Result<String, RazorError> {
    let collaborators = args.collaborators();
    let mut session = Session::default();
    let mut file_path = args.file_path;
    let mut page = render(
        &args.template,
        &file_path,
        args.model.clone(),
        None,
        &mut session,
        collaborators,
        0,
    )?;

    while let Some(layout) = page.layout.take() {
        log::debug!("applying layout '{}' to {}", layout, file_path);
        let resolved = collaborators
            .resolver
            .find_partial_sync(&layout, &file_path)?;
        page = render(
            &resolved.data,
            &resolved.file_path,
            args.model.clone(),
            Some(page.html),
            &mut session,
            collaborators,
            0,
        )?;
        file_path = resolved.file_path;
    }
    Ok(page.html)
}

/// Continuation form of [`compile_sync`]. Layouts are resolved through
/// [`TemplateResolver::find_partial`]; `done` runs exactly once, with the
/// final markup or the first error.
pub fn compile<'a>(args: CompileArgs<'a>, done: impl FnOnce(Result<String, RazorError>) + 'a) {
    let collaborators = args.collaborators();
    let mut session = Session::default();
    let rendered = render(
        &args.template,
        &args.file_path,
        args.model.clone(),
        None,
        &mut session,
        collaborators,
        0,
    );
    match rendered {
        Ok(page) => compose(
            page,
            args.file_path,
            args.model,
            session,
            collaborators,
            Box::new(done),
        ),
        Err(e) => done(Err(e)),
    }
}

fn compose<'a>(
    page: Page,
    file_path: String,
    model: RuntimeValue,
    mut session: Session,
    collaborators: Collaborators<'a>,
    done: Completion<'a, String>,
) {
    let Some(layout) = page.layout else {
        return done(Ok(page.html));
    };

    log::debug!("resolving layout '{}' for {}", layout, file_path);
    let body = page.html;
    collaborators.resolver.find_partial(
        &layout,
        &file_path,
        Box::new(move |resolved| {
            let resolved = match resolved {
                Ok(resolved) => resolved,
                Err(e) => return done(Err(e)),
            };
            match render(
                &resolved.data,
                &resolved.file_path,
                model.clone(),
                Some(body),
                &mut session,
                collaborators,
                0,
            ) {
                Ok(page) => compose(
                    page,
                    resolved.file_path,
                    model,
                    session,
                    collaborators,
                    done,
                ),
                Err(e) => done(Err(e)),
            }
        }),
    );
}

/// Parse, generate and execute one template.
pub(crate) fn render(
    template: &str,
    file_path: &str,
    model: RuntimeValue,
    body: Option<String>,
    session: &mut Session,
    collaborators: Collaborators<'_>,
    depth: usize,
) -> Result<Page, RazorError> {
    log::debug!("rendering {}", file_path);
    let program = razor::compile(template, file_path, &mut session.parsed)?;

    let mut context = HtmlContext::new(file_path, model, body, session, collaborators, depth);
    collaborators
        .evaluator
        .execute(&program, &mut context)
        .map_err(|e| into_template_error(e, file_path))?;
    context.finish()
}

/// Template errors raised by the host pass through; anything else the
/// evaluator raised is reported against `file_path`.
fn into_template_error(error: RuntimeError, file_path: &str) -> RazorError {
    match error {
        RuntimeError::Template(e) => e,
        other => RazorError::new(
            ErrorKind::Evaluation {
                message: other.to_string(),
            },
            file_path,
        )
        .with_cause(other),
    }
}

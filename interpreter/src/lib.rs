pub mod builtins;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod html;
pub mod resolver;
pub mod runtime_value;
pub mod script;
pub mod sections;

pub use error::RuntimeError;
pub use evaluator::{Evaluator, Host, ScriptEvaluator};
pub use executor::{CompileArgs, Session, compile, compile_sync};
pub use html::{HtmlContext, encode};
pub use resolver::{
    Completion, FileResolver, MemoryResolver, NoViews, ResolvedTemplate, TemplateResolver,
};
pub use runtime_value::RuntimeValue;
pub use sections::CapturedSections;

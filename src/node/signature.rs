use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::node::function::Args;
use crate::node::widgets::{DefaultValue, ParamDefault};
use crate::runtime::live::ChangeToken;
use crate::types::Annotation;

/// How the function is bound to its owner type, if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Receiver {
    #[default]
    Free,
    /// `&self` method: the first declared parameter is the receiver.
    Instance,
    /// Associated function taking the owner type as its first parameter.
    Class,
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Annotation,
    pub default: ParamDefault,
}

/// Explicit description of a function's signature and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub module: String,
    pub name: String,
    pub owner: Option<String>,
    pub receiver: Receiver,
    pub params: Vec<Param>,
    pub returns: Annotation,
    pub doc: Option<String>,
    pub file: Option<PathBuf>,
    pub line: u32,
    pub source: Option<String>,
}

impl FunctionSpec {
    pub fn new(module: &str, name: &str) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            owner: None,
            receiver: Receiver::Free,
            params: Vec::new(),
            returns: Annotation::Empty,
            doc: None,
            file: None,
            line: 0,
            source: None,
        }
    }

    pub fn method_of(mut self, owner: &str, receiver: Receiver) -> Self {
        self.owner = Some(owner.to_string());
        self.receiver = receiver;
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    pub fn located(mut self, file: impl AsRef<Path>, line: u32) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self.line = line;
        self
    }

    /// Source text used to fingerprint the implementation.
    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn param(self, name: &str, annotation: Annotation, default: impl Into<DefaultValue>) -> Self {
        self.with_default(name, annotation, ParamDefault::value(default))
    }

    /// No default: the editor must supply a connection.
    pub fn required(self, name: &str, annotation: Annotation) -> Self {
        self.with_default(name, annotation, ParamDefault::Absent)
    }

    /// Explicit null default.
    pub fn nullable(self, name: &str, annotation: Annotation) -> Self {
        self.with_default(name, annotation, ParamDefault::Null)
    }

    pub fn with_default(mut self, name: &str, annotation: Annotation, default: ParamDefault) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            annotation,
            default,
        });
        self
    }

    pub fn returns(mut self, annotation: Annotation) -> Self {
        self.returns = annotation;
        self
    }

    pub fn qualname(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }

    /// Fully qualified identity: `module::Owner.name`.
    pub fn path(&self) -> String {
        if self.module.is_empty() {
            self.qualname()
        } else {
            format!("{}::{}", self.module, self.qualname())
        }
    }

    pub fn source_location(&self) -> String {
        let file = self
            .file
            .as_ref()
            .map(|f| f.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        format!("{}:{}", file, self.line)
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    pub fn skips_first_param(&self) -> bool {
        matches!(self.receiver, Receiver::Instance | Receiver::Class)
    }
}

pub type ValidateInputsFn = Arc<dyn Fn(&Args) -> anyhow::Result<()> + Send + Sync>;
pub type IsChangedFn = Arc<dyn Fn(&Args) -> anyhow::Result<ChangeToken> + Send + Sync>;

/// Per-node presentation and behaviour options.
#[derive(Clone, Default)]
pub struct NodeOptions {
    pub category: Option<String>,
    pub display_name: Option<String>,
    pub workflow_name: Option<String>,
    pub description: Option<String>,
    pub is_output_node: bool,
    pub return_types: Option<Vec<Annotation>>,
    pub return_names: Option<Vec<String>>,
    pub validate_inputs: Option<ValidateInputsFn>,
    pub is_changed: Option<IsChangedFn>,
    pub always_run: bool,
    pub debug: bool,
    pub color: Option<String>,
    pub bg_color: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn workflow_name(mut self, name: &str) -> Self {
        self.workflow_name = Some(name.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn output_node(mut self) -> Self {
        self.is_output_node = true;
        self
    }

    pub fn return_types(mut self, types: impl IntoIterator<Item = Annotation>) -> Self {
        self.return_types = Some(types.into_iter().collect());
        self
    }

    pub fn return_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.return_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate_inputs<F>(mut self, f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.validate_inputs = Some(Arc::new(f));
        self
    }

    pub fn is_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<ChangeToken> + Send + Sync + 'static,
    {
        self.is_changed = Some(Arc::new(f));
        self
    }

    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    pub fn color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn bg_color(mut self, color: &str) -> Self {
        self.bg_color = Some(color.to_string());
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

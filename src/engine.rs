use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Template;
use crate::builtins;
use crate::compiler::Compiler;
use crate::dom::{Document, Element, ServerDocument};
use crate::error::{CompileError, Error, Result};
use crate::expression::{Expression, Registry};
use crate::options::Options;
use crate::renderer::Renderer;
use crate::source::SourceProvider;
use crate::value::{Object, Value};

/// Function run by a command tag such as `<%= value %>`
pub type Command = Rc<dyn Fn(&Renderer, Vec<Value>) -> Result<()>>;

struct Inner {
    options: Options,
    registry: RefCell<Registry>,
    commands: RefCell<IndexMap<String, Command>>,
    helpers: RefCell<Object>,
    globals: Object,
    compiled: RefCell<HashMap<String, Result<Rc<Template>, CompileError>>>,
    source: RefCell<Option<Rc<dyn SourceProvider>>>,
    document: RefCell<Rc<dyn Document>>,
}

/// Compiles templates, caches them and starts renders.
///
/// Cloning is cheap and every clone shares the same caches and registrations.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<Inner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Engine {
    pub fn new(options: Options) -> Self {
        let mut commands: IndexMap<String, Command> = IndexMap::new();
        commands.insert("=".to_string(), Rc::new(echo));
        Self {
            inner: Rc::new(Inner {
                options,
                registry: RefCell::new(Registry::standard()),
                commands: RefCell::new(commands),
                helpers: RefCell::new(Object::new()),
                globals: builtins::globals(),
                compiled: RefCell::new(HashMap::new()),
                source: RefCell::new(None),
                document: RefCell::new(Rc::new(ServerDocument)),
            }),
        }
    }

    pub fn with_source(options: Options, source: impl SourceProvider + 'static) -> Self {
        let engine = Self::new(options);
        engine.set_source(source);
        engine
    }

    pub fn set_source(&self, source: impl SourceProvider + 'static) {
        *self.inner.source.borrow_mut() = Some(Rc::new(source));
    }

    pub fn set_document(&self, document: impl Document + 'static) {
        *self.inner.document.borrow_mut() = Rc::new(document);
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn document(&self) -> Rc<dyn Document> {
        self.inner.document.borrow().clone()
    }

    pub fn create_element(&self, tag: &str) -> Element {
        self.document().create_element(tag)
    }

    /// Add an expression kind; it takes precedence over kinds with the same keyword
    pub fn register_expression(&self, kind: impl Expression + 'static) {
        self.inner.registry.borrow_mut().register(Rc::new(kind));
    }

    pub fn register_command(
        &self,
        name: &str,
        command: impl Fn(&Renderer, Vec<Value>) -> Result<()> + 'static,
    ) {
        self.inner
            .commands
            .borrow_mut()
            .insert(name.to_string(), Rc::new(command));
    }

    /// Make a value visible to every template, after scope variables
    pub fn register_helper(&self, name: &str, value: impl Into<Value>) {
        self.inner
            .helpers
            .borrow_mut()
            .insert(name.to_string(), value.into());
    }

    pub fn helper(&self, name: &str) -> Option<Value> {
        self.inner.helpers.borrow().get(name).cloned()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.inner.globals.get(name).cloned()
    }

    pub(crate) fn command(&self, name: &str) -> Option<Command> {
        self.inner.commands.borrow().get(name).cloned()
    }

    /// Compile `source` as template `name`, replacing any cached version
    pub fn compile(&self, name: &str, source: &str) -> Result<Rc<Template>, CompileError> {
        let commands: Vec<String> = self.inner.commands.borrow().keys().cloned().collect();
        let result = {
            let registry = self.inner.registry.borrow();
            Compiler::new(&self.inner.options, &registry, commands)
                .compile(name, source)
                .map(Rc::new)
        };
        match &result {
            Ok(template) => tracing::debug!(template = name, nodes = template.nodes.len(), "compiled template"),
            Err(err) => tracing::error!("{}", err.render(source)),
        }
        self.inner
            .compiled
            .borrow_mut()
            .insert(name.to_string(), result.clone());
        result
    }

    /// Cached compile result, without touching the source provider
    pub fn compiled(&self, name: &str) -> Option<Result<Rc<Template>, CompileError>> {
        self.inner.compiled.borrow().get(name).cloned()
    }

    /// Source of an already compiled template
    pub fn source_of(&self, name: &str) -> Option<Rc<str>> {
        match self.compiled(name)? {
            Ok(template) => Some(template.source.clone()),
            Err(_) => None,
        }
    }

    /// Compiled template `name`, fetching its source on first use
    pub async fn get_compiled(&self, name: &str) -> Result<Rc<Template>> {
        if let Some(result) = self.compiled(name) {
            return result.map_err(Error::from);
        }
        let source = self.inner.source.borrow().clone();
        let Some(source) = source else {
            return Err(Error::NotFound(name.to_string()));
        };
        let text = source.get_source(name).await?;
        Ok(self.compile(name, &text)?)
    }

    /// Prefer `<name>.<theme>` when a theme is active
    pub async fn get_themed(&self, name: &str, theme: Option<&str>) -> Result<Rc<Template>> {
        if let Some(theme) = theme {
            match self.get_compiled(&format!("{}.{}", name, theme)).await {
                Err(Error::NotFound(_)) => {}
                found => return found,
            }
        }
        self.get_compiled(name).await
    }

    /// Prepare a render of template `name`; nothing runs until [`Renderer::finish`]
    pub fn render(&self, name: &str, variables: impl Into<Value>) -> Renderer {
        Renderer::new(self.clone(), name, variables.into())
    }

    pub fn render_template(&self, template: Rc<Template>, variables: impl Into<Value>) -> Renderer {
        Renderer::for_template(self.clone(), template, variables.into())
    }

    /// Compile and render in one go
    pub async fn render_source(
        &self,
        name: &str,
        source: &str,
        variables: impl Into<Value>,
    ) -> Result<String> {
        let template = self.compile(name, source)?;
        self.render_template(template, variables).finish().await
    }
}

/// `<%= a, b %>` prints each value
fn echo(renderer: &Renderer, values: Vec<Value>) -> Result<()> {
    for value in values {
        renderer.print(value)?;
    }
    Ok(())
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.inner.options)
            .field("compiled", &self.inner.compiled.borrow().len())
            .finish()
    }
}

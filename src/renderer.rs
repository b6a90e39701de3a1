//! Per-render state: blocks, template frames, the placeholder queue and the
//! expression instance stack.
//!
//! Template bodies execute synchronously. Anything that needs another
//! template or asynchronous content leaves a [`Placeholder`] in the current
//! block; placeholders are resolved while blocks are assembled, which is the
//! only place the render awaits.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use futures_util::future::{FutureExt, LocalBoxFuture};
use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::Template;
use crate::block_buffer::{
    AssignSlot, BlockBuffer, BlockOptions, BlockOrigin, ContentMode, Placeholder,
    PlaceholderKind, TemplateCall,
};
use crate::content::{Content, LOOP_MARKER, Renderable};
use crate::dom::{Element, escape_text};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::expression::Expression;
use crate::interpreter::{Instance, Interpreter};
use crate::scope::{EachContext, Scope};
use crate::value::{Object, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    Pending,
    Executing,
    Finishing,
    Done,
    Errored,
}

/// Renderer members callable from templates by bare name or `this.<name>`
const MEMBERS: &[&str] = &[
    "print",
    "print_text",
    "printText",
    "start",
    "end",
    "assign",
    "implement",
    "include",
    "partial",
    "expands",
    "extends",
    "set_theme",
    "setTheme",
    "expose",
    "trim",
    "trim_blank",
    "trimBlank",
    "create_element",
    "createElement",
    "open_element",
    "openElement",
    "element_id",
];

#[derive(Clone)]
enum Entry {
    Name(String),
    Template(Rc<Template>),
}

/// Template currently executing
struct TemplateFrame {
    name: String,
    scope_id: usize,
    level: usize,
    depth: usize,
    /// Index of the template's root buffer on the block stack
    stack_base: usize,
    expands: Option<String>,
}

/// Block definition as recorded in the render history
#[derive(Debug, Clone, Serialize)]
pub struct BlockRecord {
    pub name: String,
    pub block_id: usize,
    pub template: Option<String>,
    pub scope_id: usize,
    pub level: usize,
    pub options: BlockOptions,
    pub instances: usize,
}

/// Snapshot of a render, for debugging and client-side hydration
#[derive(Debug, Clone, Serialize)]
pub struct RenderHistory {
    pub entry: String,
    pub state: RenderState,
    pub theme: Option<String>,
    pub templates: Vec<String>,
    pub blocks: Vec<BlockRecord>,
    pub variables: serde_json::Value,
    pub exposed: serde_json::Value,
}

struct Inner {
    engine: Engine,
    entry: Entry,
    variables: Value,
    state: Cell<RenderState>,
    next_element_id: Cell<usize>,
    next_block_id: Cell<usize>,
    next_scope_id: Cell<usize>,
    blocks: RefCell<IndexMap<(usize, String), Rc<BlockBuffer>>>,
    block_stack: RefCell<Vec<Rc<BlockBuffer>>>,
    frames: RefCell<Vec<TemplateFrame>>,
    instances: RefCell<Vec<Instance>>,
    queue: RefCell<VecDeque<Rc<Placeholder>>>,
    theme: RefCell<Option<String>>,
    exposed: RefCell<Object>,
    resolving: RefCell<HashSet<usize>>,
    resolved: RefCell<HashMap<usize, Content>>,
    error_context: RefCell<Option<(String, usize)>>,
    templates: RefCell<Vec<String>>,
    output: RefCell<Option<Rc<BlockBuffer>>>,
}

/// One render of a template, created by [`Engine::render`]
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<Inner>,
}

impl Renderer {
    pub(crate) fn new(engine: Engine, name: &str, variables: Value) -> Self {
        Self::with_entry(engine, Entry::Name(name.to_string()), variables)
    }

    pub(crate) fn for_template(engine: Engine, template: Rc<Template>, variables: Value) -> Self {
        Self::with_entry(engine, Entry::Template(template), variables)
    }

    fn with_entry(engine: Engine, entry: Entry, variables: Value) -> Self {
        Self {
            inner: Rc::new(Inner {
                engine,
                entry,
                variables,
                state: Cell::new(RenderState::Pending),
                next_element_id: Cell::new(0),
                next_block_id: Cell::new(0),
                next_scope_id: Cell::new(1),
                blocks: RefCell::new(IndexMap::new()),
                block_stack: RefCell::new(Vec::new()),
                frames: RefCell::new(Vec::new()),
                instances: RefCell::new(Vec::new()),
                queue: RefCell::new(VecDeque::new()),
                theme: RefCell::new(None),
                exposed: RefCell::new(Object::new()),
                resolving: RefCell::new(HashSet::new()),
                resolved: RefCell::new(HashMap::new()),
                error_context: RefCell::new(None),
                templates: RefCell::new(Vec::new()),
                output: RefCell::new(None),
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn state(&self) -> RenderState {
        self.inner.state.get()
    }

    pub fn variables(&self) -> &Value {
        &self.inner.variables
    }

    pub fn set_theme(&self, theme: Option<&str>) {
        *self.inner.theme.borrow_mut() = theme.filter(|t| !t.is_empty()).map(str::to_string);
    }

    pub fn theme(&self) -> Option<String> {
        self.inner.theme.borrow().clone()
    }

    /// Make a value available to client-side code through the history
    pub fn expose(&self, name: &str, value: Value) {
        self.inner.exposed.borrow_mut().insert(name.to_string(), value);
    }

    pub fn exposed(&self) -> Object {
        self.inner.exposed.borrow().clone()
    }

    /// Root buffer of the entry template, available once [`Renderer::finish`] succeeded
    pub fn output(&self) -> Option<Rc<BlockBuffer>> {
        self.inner.output.borrow().clone()
    }

    /// Blocks defined so far, keyed by scope id and name
    pub fn blocks(&self) -> Vec<Rc<BlockBuffer>> {
        self.inner.blocks.borrow().values().cloned().collect()
    }

    pub fn block(&self, name: &str) -> Option<Rc<BlockBuffer>> {
        let scope_id = self.frame_info().map_or(0, |frame| frame.scope_id);
        self.inner
            .blocks
            .borrow()
            .get(&(scope_id, name.to_string()))
            .cloned()
    }

    fn next(counter: &Cell<usize>) -> usize {
        let id = counter.get();
        counter.set(id + 1);
        id
    }

    /// Next id for generated elements, `<prefix>-<n>`
    pub fn element_id(&self) -> String {
        format!(
            "{}-{}",
            self.engine().options().id_prefix,
            Self::next(&self.inner.next_element_id)
        )
    }

    pub fn create_element(&self, tag: &str) -> Element {
        self.engine().document().create_element(tag)
    }

    // Template frames

    fn frame_info(&self) -> Option<FrameInfo> {
        self.inner.frames.borrow().last().map(|frame| FrameInfo {
            name: frame.name.clone(),
            scope_id: frame.scope_id,
            level: frame.level,
            depth: frame.depth,
            stack_base: frame.stack_base,
        })
    }

    pub(crate) fn set_error_context(&self, template: &str, line: usize) {
        let mut context = self.inner.error_context.borrow_mut();
        match context.as_mut() {
            Some((name, current)) if name == template => *current = line,
            _ => *context = Some((template.to_string(), line)),
        }
    }

    fn locate(&self, err: Error) -> Error {
        let context = self.inner.error_context.borrow().clone();
        match context {
            Some((template, line)) => {
                let source = self.engine().source_of(&template);
                err.locate(&template, line, source.as_deref())
            }
            None => err,
        }
    }

    // Expression instances

    pub(crate) fn push_instance(&self, kind: Rc<dyn Expression>) -> usize {
        let mut instances = self.inner.instances.borrow_mut();
        instances.push(Instance {
            kind,
            broken: false,
            context: None,
        });
        instances.len() - 1
    }

    pub(crate) fn pop_instance(&self) {
        self.inner.instances.borrow_mut().pop();
    }

    pub(crate) fn instance_broken(&self, index: usize) -> bool {
        self.inner
            .instances
            .borrow()
            .get(index)
            .is_some_and(|instance| instance.broken)
    }

    pub(crate) fn break_instance(&self, index: usize) {
        if let Some(instance) = self.inner.instances.borrow_mut().get_mut(index) {
            instance.broken = true;
        }
    }

    pub(crate) fn set_instance_context(&self, index: usize, context: Rc<EachContext>) {
        if let Some(instance) = self.inner.instances.borrow_mut().get_mut(index) {
            instance.context = Some(context);
        }
    }

    pub(crate) fn instance_context(&self, index: usize) -> Option<Rc<EachContext>> {
        self.inner
            .instances
            .borrow()
            .get(index)
            .and_then(|instance| instance.context.clone())
    }

    pub(crate) fn top_instance(&self) -> Option<(Rc<dyn Expression>, Option<Rc<EachContext>>)> {
        self.inner
            .instances
            .borrow()
            .last()
            .map(|instance| (instance.kind.clone(), instance.context.clone()))
    }

    // Output

    pub fn current_block(&self) -> Result<Rc<BlockBuffer>> {
        self.inner
            .block_stack
            .borrow()
            .last()
            .cloned()
            .ok_or_else(|| Error::runtime("Nothing is being rendered"))
    }

    /// Print a value into the current block. Strings go out verbatim.
    pub fn print(&self, value: Value) -> Result<()> {
        let block = self.current_block()?;
        match value {
            Value::Undefined | Value::Null => {}
            Value::String(text) => {
                block.push_text(text.as_ref());
            }
            Value::Element(element) => {
                block.push_element(element);
            }
            Value::Content(renderable) => {
                block.push_placeholder(Placeholder::new(PlaceholderKind::Renderable(renderable)));
            }
            Value::Array(items) => {
                for item in items.iter() {
                    self.print(item.clone())?;
                }
            }
            other => {
                block.push_text(other.to_string());
            }
        }
        Ok(())
    }

    /// Print a value with HTML special characters escaped
    pub fn print_text(&self, value: &Value) -> Result<()> {
        if value.is_nullish() {
            return Ok(());
        }
        self.current_block()?.push_text(escape_text(&value.to_string()));
        Ok(())
    }

    pub fn print_html(&self, html: &str) -> Result<()> {
        self.current_block()?.push_text(html);
        Ok(())
    }

    /// Open block `name` in the current scope; output goes there until [`Renderer::end`]
    pub fn start(&self, name: &str, options: BlockOptions) -> Result<Rc<BlockBuffer>> {
        let frame = self.frame_info();
        let origin = BlockOrigin {
            template: frame.as_ref().map(|frame| frame.name.clone()),
            scope_id: frame.as_ref().map_or(0, |frame| frame.scope_id),
            level: frame.as_ref().map_or(0, |frame| frame.level),
        };
        let key = (origin.scope_id, name.to_string());
        let push = options.content == ContentMode::Push;
        let block = BlockBuffer::new(
            Some(name),
            Self::next(&self.inner.next_block_id),
            origin.clone(),
            options,
        );

        let existing = self.inner.blocks.borrow().get(&key).cloned();
        match existing {
            Some(existing) if push => existing.add_instance(block.clone()),
            Some(existing) if existing.origin().level < origin.level => {
                tracing::trace!(block = name, level = origin.level, "keeping block defined by an expanding template");
            }
            _ => {
                self.inner.blocks.borrow_mut().insert(key, block.clone());
            }
        }

        self.inner.block_stack.borrow_mut().push(block.clone());
        Ok(block)
    }

    /// Close the innermost open block, or the innermost one called `name`
    pub fn end(&self, name: Option<&str>) -> Result<()> {
        let base = self.frame_info().map_or(0, |frame| frame.stack_base);
        let mut stack = self.inner.block_stack.borrow_mut();
        let position = match name {
            None => (stack.len() > base + 1).then(|| stack.len() - 1),
            Some(name) => stack
                .iter()
                .enumerate()
                .skip(base + 1)
                .rev()
                .find(|(_, block)| block.name() == name)
                .map(|(index, _)| index),
        };
        match position {
            Some(index) => stack.truncate(index),
            None => tracing::debug!(block = ?name, "no open block to end"),
        }
        Ok(())
    }

    /// Leave a slot for block `name` of the current scope
    pub fn assign(&self, name: &str, options: BlockOptions) -> Result<()> {
        let scope_id = self.frame_info().map_or(0, |frame| frame.scope_id);
        self.current_block()?
            .push_placeholder(Placeholder::new(PlaceholderKind::Assign(AssignSlot {
                name: name.to_string(),
                scope_id,
                options,
            })));
        Ok(())
    }

    /// Render `name` with the current scope, in place. Rendering starts right away.
    pub fn implement(&self, name: &str, scope: &Scope, variables: &Value) -> Result<()> {
        self.template_placeholder(name, scope, variables, false, true)
    }

    /// Like [`Renderer::implement`], but rendering waits for assembly
    pub fn include(&self, name: &str, scope: &Scope, variables: &Value) -> Result<()> {
        self.template_placeholder(name, scope, variables, false, false)
    }

    /// Render `name` with its own block namespace
    pub fn partial(&self, name: &str, scope: &Scope, variables: &Value) -> Result<()> {
        self.template_placeholder(name, scope, variables, true, true)
    }

    fn template_placeholder(
        &self,
        name: &str,
        scope: &Scope,
        variables: &Value,
        isolated: bool,
        eager: bool,
    ) -> Result<()> {
        let frame = self.frame_info();
        let scope_id = if isolated {
            Self::next(&self.inner.next_scope_id)
        } else {
            frame.as_ref().map_or(0, |frame| frame.scope_id)
        };
        let placeholder = Placeholder::new(PlaceholderKind::Template(TemplateCall {
            name: name.to_string(),
            scope: scope.child_with(variables),
            scope_id,
            depth: frame.map_or(0, |frame| frame.depth) + 1,
        }));
        self.current_block()?.push_placeholder(placeholder.clone());
        if eager {
            self.inner.queue.borrow_mut().push_back(placeholder);
        }
        Ok(())
    }

    /// Render the current template's output inside `name`'s blocks
    pub fn expands(&self, name: &str) -> Result<()> {
        match self.inner.frames.borrow_mut().last_mut() {
            Some(frame) => {
                frame.expands = Some(name.to_string());
                Ok(())
            }
            None => Err(Error::runtime("`expands` used outside of a template")),
        }
    }

    /// Create an element with attributes and print it
    pub fn open_element(&self, tag: &str, attributes: &Value) -> Result<Element> {
        let element = self.create_element(tag);
        if let Value::Object(entries) = attributes {
            for (key, value) in entries.iter() {
                match key.as_str() {
                    "class" | "className" => element.add_class(&value.to_string()),
                    _ if value.is_nullish() => {}
                    _ => element.set_attribute(key, value.to_string()),
                }
            }
        }
        self.current_block()?.push_element(element.clone());
        Ok(element)
    }

    /// Dispatch a template call to a renderer member
    pub(crate) fn call_member(
        &self,
        name: &str,
        args: Vec<Value>,
        scope: &Scope,
    ) -> Option<Result<Value>> {
        if !MEMBERS.contains(&name) {
            return None;
        }
        Some(self.invoke_member(name, args, scope))
    }

    fn invoke_member(&self, name: &str, args: Vec<Value>, scope: &Scope) -> Result<Value> {
        let arg = |index: usize| args.get(index).cloned().unwrap_or_default();
        let required = |index: usize| -> Result<String> {
            match arg(index) {
                value if value.is_nullish() => {
                    Err(Error::runtime(format!("`{}` expects a name", name)))
                }
                value => Ok(value.to_string()),
            }
        };

        match name {
            "print" => {
                for value in args.iter().cloned() {
                    self.print(value)?;
                }
            }
            "print_text" | "printText" => {
                for value in &args {
                    self.print_text(value)?;
                }
            }
            "start" => {
                self.start(&required(0)?, BlockOptions::from_value(&arg(1))?)?;
            }
            "end" => {
                let block = arg(0);
                self.end((!block.is_nullish()).then(|| block.to_string()).as_deref())?;
            }
            "assign" => self.assign(&required(0)?, BlockOptions::from_value(&arg(1))?)?,
            "implement" => self.implement(&required(0)?, scope, &arg(1))?,
            "include" => self.include(&required(0)?, scope, &arg(1))?,
            "partial" => self.partial(&required(0)?, scope, &arg(1))?,
            "expands" | "extends" => self.expands(&required(0)?)?,
            "set_theme" | "setTheme" => {
                let theme = arg(0);
                self.set_theme((!theme.is_nullish()).then(|| theme.to_string()).as_deref());
            }
            "expose" => self.expose(&required(0)?, arg(1)),
            "trim" if args.is_empty() => self.current_block()?.trim(true, true),
            "trim" => self.current_block()?.trim(arg(0).is_truthy(), arg(1).is_truthy()),
            "trim_blank" | "trimBlank" => self.current_block()?.trim_blank(),
            "create_element" | "createElement" => {
                return Ok(Value::Element(self.create_element(&required(0)?)));
            }
            "open_element" | "openElement" => {
                return self.open_element(&required(0)?, &arg(1)).map(Value::Element);
            }
            "element_id" => return Ok(Value::string(self.element_id())),
            _ => {}
        }
        Ok(Value::Undefined)
    }

    // Rendering

    /// Execute the entry template and everything it pulls in, then assemble
    /// the output. A renderer can only finish once.
    pub async fn finish(&self) -> Result<String> {
        if self.state() != RenderState::Pending {
            return Err(Error::runtime("This renderer has already been used"));
        }
        self.inner.state.set(RenderState::Executing);
        let result = self.run().await;
        match &result {
            Ok(_) => self.inner.state.set(RenderState::Done),
            Err(err) => {
                self.inner.state.set(RenderState::Errored);
                tracing::debug!(error = %err, "render failed");
            }
        }
        result
    }

    async fn run(&self) -> Result<String> {
        let scope = Scope::from_value(&self.inner.variables);
        let root = self.render_chain(self.inner.entry.clone(), scope, 0, 0).await?;
        *self.inner.output.borrow_mut() = Some(root.clone());

        self.process_queue().await?;
        self.inner.state.set(RenderState::Finishing);
        root.assemble(self).await?;
        root.to_html()
    }

    /// Render `name` into a detached buffer with its own block namespace.
    ///
    /// Meant for [`Renderable`] implementations; the buffer is assembled
    /// together with the content that returns it.
    pub fn render_template<'a>(
        &'a self,
        name: &'a str,
        variables: &'a Value,
    ) -> LocalBoxFuture<'a, Result<Rc<BlockBuffer>>> {
        async move {
            let scope = Scope::from_value(&self.inner.variables).child_with(variables);
            let scope_id = Self::next(&self.inner.next_scope_id);
            self.render_chain(Entry::Name(name.to_string()), scope, scope_id, 1)
                .await
        }
        .boxed_local()
    }

    async fn template(&self, entry: Entry) -> Result<Rc<Template>> {
        match entry {
            Entry::Template(template) => Ok(template),
            Entry::Name(name) => {
                let theme = self.theme();
                self.engine().get_themed(&name, theme.as_deref()).await
            }
        }
    }

    /// Execute a template, then every template it expands, each one level up
    async fn render_chain(
        &self,
        entry: Entry,
        scope: Scope,
        scope_id: usize,
        depth: usize,
    ) -> Result<Rc<BlockBuffer>> {
        let mut template = self.template(entry).await?;
        let mut level = 0;
        loop {
            let (root, expands) = self.execute(&template, &scope, scope_id, level, depth + level)?;
            match expands {
                Some(parent) => {
                    template = self.template(Entry::Name(parent)).await?;
                    level += 1;
                }
                None => return Ok(root),
            }
        }
    }

    fn execute(
        &self,
        template: &Rc<Template>,
        scope: &Scope,
        scope_id: usize,
        level: usize,
        depth: usize,
    ) -> Result<(Rc<BlockBuffer>, Option<String>)> {
        let max_depth = self.engine().options().max_depth;
        if depth > max_depth {
            return Err(Error::runtime(format!(
                "Template `{}` is nested more than {} levels deep",
                template.name, max_depth
            )));
        }

        let root = BlockBuffer::new(
            None,
            Self::next(&self.inner.next_block_id),
            BlockOrigin {
                template: Some(template.name.clone()),
                scope_id,
                level,
            },
            BlockOptions::default(),
        );

        let stack_base = {
            let mut stack = self.inner.block_stack.borrow_mut();
            stack.push(root.clone());
            stack.len() - 1
        };
        self.inner.frames.borrow_mut().push(TemplateFrame {
            name: template.name.clone(),
            scope_id,
            level,
            depth,
            stack_base,
            expands: None,
        });
        self.inner.templates.borrow_mut().push(template.name.clone());
        let previous_context = self.inner.error_context.borrow_mut().take();
        tracing::debug!(template = %template.name, scope_id, level, "executing template");

        let result = Interpreter::new(self, template.clone()).run(&template.nodes, scope);
        let result = result.map_err(|err| self.locate(err));

        self.inner.block_stack.borrow_mut().truncate(stack_base);
        let frame = self.inner.frames.borrow_mut().pop();
        *self.inner.error_context.borrow_mut() = previous_context;

        result?;
        Ok((root, frame.and_then(|frame| frame.expands)))
    }

    /// Resolve queued placeholders until the queue is empty
    pub(crate) async fn process_queue(&self) -> Result<()> {
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(placeholder) = next else {
                return Ok(());
            };
            self.resolve_placeholder(&placeholder).await?;
        }
    }

    pub(crate) async fn resolve_placeholder(&self, placeholder: &Rc<Placeholder>) -> Result<()> {
        if placeholder.is_resolved() {
            return Ok(());
        }
        let content = match &placeholder.kind {
            PlaceholderKind::Template(call) => {
                let buffer = self
                    .render_chain(
                        Entry::Name(call.name.clone()),
                        call.scope.clone(),
                        call.scope_id,
                        call.depth,
                    )
                    .await?;
                Content::Block(buffer)
            }
            PlaceholderKind::Assign(slot) => self.resolve_assign(slot).await?,
            PlaceholderKind::Renderable(renderable) => self.resolve_renderable(renderable).await?,
        };
        placeholder.resolve(content);
        Ok(())
    }

    async fn resolve_assign(&self, slot: &AssignSlot) -> Result<Content> {
        let block = self
            .inner
            .blocks
            .borrow()
            .get(&(slot.scope_id, slot.name.clone()))
            .cloned();
        let Some(block) = block else {
            return Ok(Content::Element(self.block_element(&slot.name, None, &slot.options)));
        };

        let html = if block.is_assembling() {
            tracing::warn!(block = %slot.name, "block is assigned inside itself");
            LOOP_MARKER.to_string()
        } else {
            block.assemble(self).await?;
            block.to_html()?
        };

        let mut options = slot.options.clone();
        if let Some(class) = block.options().class_name {
            options.class_name = Some(match options.class_name {
                Some(own) => format!("{} {}", own, class),
                None => class,
            });
        }
        let element = self.block_element(&slot.name, block.origin().template.as_deref(), &options);
        element.append_html(html);
        Ok(Content::Element(element))
    }

    async fn resolve_renderable(&self, renderable: &Rc<dyn Renderable>) -> Result<Content> {
        let key = Rc::as_ptr(renderable) as *const () as usize;
        if let Some(content) = self.inner.resolved.borrow().get(&key).cloned() {
            return Ok(content);
        }
        if !self.inner.resolving.borrow_mut().insert(key) {
            tracing::warn!("content is printed inside itself");
            return Ok(Content::Html(LOOP_MARKER.to_string()));
        }

        let result = async {
            let content = renderable.render_content(self).await?;
            self.prepare_content(&content).await?;
            Ok::<_, Error>(content)
        }
        .await;
        self.inner.resolving.borrow_mut().remove(&key);

        let content = result?;
        self.inner.resolved.borrow_mut().insert(key, content.clone());
        Ok(content)
    }

    /// Assemble the buffers a piece of content refers to
    pub(crate) fn prepare_content<'a>(&'a self, content: &'a Content) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            match content {
                Content::Block(block) if !block.is_assembling() => block.assemble(self).await,
                Content::List(items) => {
                    for item in items {
                        self.prepare_content(item).await?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            }
        }
        .boxed_local()
    }

    /// `he-block` element wrapping the content of block `name`
    pub(crate) fn block_element(
        &self,
        name: &str,
        template: Option<&str>,
        options: &BlockOptions,
    ) -> Element {
        let element = self.create_element("he-block");
        if let Some(class) = &options.class_name {
            element.add_class(class);
        }
        for (key, value) in &options.attributes {
            element.set_attribute(key, value.clone());
        }
        element.set_attribute("data-hid", self.element_id());
        element.set_data("heName", name);
        if let Some(template) = template {
            element.set_data("heTemplate", template);
        }
        if let Some(theme) = self.theme() {
            element.set_data("theme", theme);
        }
        element
    }

    pub fn history(&self) -> RenderHistory {
        let entry = match &self.inner.entry {
            Entry::Name(name) => name.clone(),
            Entry::Template(template) => template.name.clone(),
        };
        let blocks = self
            .inner
            .blocks
            .borrow()
            .values()
            .map(|block| BlockRecord {
                name: block.name().to_string(),
                block_id: block.block_id(),
                template: block.origin().template.clone(),
                scope_id: block.origin().scope_id,
                level: block.origin().level,
                options: block.options(),
                instances: block.other_instances().len() + 1,
            })
            .collect();
        RenderHistory {
            entry,
            state: self.state(),
            theme: self.theme(),
            templates: self.inner.templates.borrow().clone(),
            blocks,
            variables: self.inner.variables.to_json(),
            exposed: Value::object(self.exposed()).to_json(),
        }
    }
}

struct FrameInfo {
    name: String,
    scope_id: usize,
    level: usize,
    depth: usize,
    stack_base: usize,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("state", &self.state())
            .field("theme", &self.theme())
            .field("blocks", &self.inner.blocks.borrow().len())
            .finish()
    }
}

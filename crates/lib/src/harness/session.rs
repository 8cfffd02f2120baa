//! The view of harness state handed to a test body.

use crate::Result;
use crate::backend::{Context, ContextOptions, Factory};

/// Access to the factory and the current context during a test body.
///
/// The harness owns the current context; the body may reuse it, replace it
/// with a differently configured one, or close it. After the body returns the
/// harness re-checks whatever context is current at that point.
pub struct Session<'h> {
    factory: &'h dyn Factory,
    current: &'h mut Option<Box<dyn Context>>,
}

impl<'h> Session<'h> {
    pub(crate) fn new(factory: &'h dyn Factory, current: &'h mut Option<Box<dyn Context>>) -> Self {
        Self { factory, current }
    }

    /// The current context if it is open, otherwise a new one with default settings.
    ///
    /// Repeated calls return the same context as long as it stays open.
    pub fn get_or_create_context(&mut self) -> Result<&mut dyn Context> {
        let context = match self.current.take() {
            Some(context) if context.is_open() => context,
            _ => {
                let context = self.factory.create_context()?;
                tracing::debug!(context = %context.id(), "Opened default context");
                context
            }
        };
        let context: &mut dyn Context = &mut **self.current.insert(context);
        Ok(context)
    }

    /// Close the current context if open, then open and install a new one
    /// configured with `options`.
    pub fn create_context(&mut self, options: &ContextOptions) -> Result<&mut dyn Context> {
        if let Some(previous) = self.current.as_mut()
            && previous.is_open()
        {
            previous.close()?;
            tracing::debug!(context = %previous.id(), "Closed context before replacing it");
        }
        let context = self.factory.create_context_with(options)?;
        tracing::debug!(context = %context.id(), ?options, "Opened configured context");
        let context: &mut dyn Context = &mut **self.current.insert(context);
        Ok(context)
    }

    /// The current context, if one is open. Never creates a context.
    pub fn current_context(&mut self) -> Option<&mut dyn Context> {
        let context: &mut dyn Context = self.current.as_deref_mut()?;
        context.is_open().then_some(context)
    }

    /// The factory of this run.
    pub fn factory(&self) -> &dyn Factory {
        self.factory
    }
}

//! Tool plugins for the research portal.
//!
//! A plugin is a local capability the language model may invoke while it
//! generates an answer. The query engine turns every registered plugin into a
//! function declaration and dispatches the model's calls back through the
//! [`PluginRegistry`].

mod plugin;
mod registry;

pub use plugin::{Permission, Plugin, PluginError, PluginOutput, Result};
pub use registry::PluginRegistry;

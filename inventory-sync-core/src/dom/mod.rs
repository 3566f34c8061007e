//! Page model
//!
//! The matcher never touches a concrete DOM. It talks to a [`Page`], which
//! exposes exactly what annotation needs: item lookup, text, two boolean
//! flags and a single badge per item. [`Document`] is the in-memory
//! implementation used by the CLI and the tests.

pub mod document;
pub mod html;
pub mod selector;

pub use document::{Document, NodeId};
pub use html::{parse_html, to_html};
pub use selector::Selector;

/// Class carried by the injected badge element
pub const BADGE_CLASS: &str = "ih-badge";

/// The two visual flags an item can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Item is sold
    Sold,
    /// Item is sold and hidden
    Hidden,
}

impl Flag {
    /// Class name used to render the flag
    pub fn class_name(self) -> &'static str {
        match self {
            Flag::Sold => "ih-sold",
            Flag::Hidden => "ih-hidden",
        }
    }
}

/// Everything annotation needs from a page
///
/// Implementations may be naive: the annotator only calls the mutating
/// methods when the observed state differs from the desired one.
pub trait Page {
    /// Handle to one item on the page
    type Item: Copy;

    /// All items matching `selector`, in page order
    fn items(&self, selector: &Selector) -> Vec<Self::Item>;

    /// Full text of an item (badge text excluded)
    fn text(&self, item: Self::Item) -> String;

    /// Text of the first element under `item` matching `selector`
    fn select_text(&self, item: Self::Item, selector: &Selector) -> Option<String>;

    fn has_flag(&self, item: Self::Item, flag: Flag) -> bool;

    fn set_flag(&mut self, item: Self::Item, flag: Flag, on: bool);

    /// Label of the item's badge, if it has one
    fn badge(&self, item: Self::Item) -> Option<String>;

    /// Attach a badge or relabel the existing one
    fn set_badge(&mut self, item: Self::Item, label: &str);

    fn remove_badge(&mut self, item: Self::Item);
}

//! Keyboard shortcut registry and documentation.

use crate::input::KeyInput;
use crate::tools::ToolKind;

/// An action bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    DeleteSelection,
    Undo,
    Redo,
    Copy,
    Paste,
    Group,
    Ungroup,
    SelectTool(ToolKind),
    OpenChat,
    CloseChat,
    OpenReactionPicker,
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct ShortcutBinding {
    pub key: &'static str,
    /// Ctrl, or Cmd on macOS.
    pub command: bool,
    pub shift: bool,
    pub action: Shortcut,
    pub description: &'static str,
}

impl ShortcutBinding {
    pub const fn new(
        key: &'static str,
        command: bool,
        shift: bool,
        action: Shortcut,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            command,
            shift,
            action,
            description,
        }
    }

    /// Format the shortcut for display (e.g., "Ctrl+Shift+Z").
    pub fn format(&self) -> String {
        let mut parts = Vec::new();
        if self.command {
            parts.push("Ctrl");
        }
        if self.shift {
            parts.push("Shift");
        }
        parts.push(self.key);
        parts.join("+")
    }

    fn matches(&self, input: &KeyInput) -> bool {
        self.key.eq_ignore_ascii_case(&input.key)
            && self.command == input.modifiers.command()
            && self.shift == input.modifiers.shift
    }
}

const BINDINGS: &[ShortcutBinding] = &[
    ShortcutBinding::new("Delete", false, false, Shortcut::DeleteSelection, "Delete selected shapes"),
    ShortcutBinding::new("Backspace", false, false, Shortcut::DeleteSelection, "Delete selected shapes"),
    ShortcutBinding::new("Z", true, false, Shortcut::Undo, "Undo"),
    ShortcutBinding::new("Z", true, true, Shortcut::Redo, "Redo"),
    ShortcutBinding::new("Y", true, false, Shortcut::Redo, "Redo"),
    ShortcutBinding::new("C", true, false, Shortcut::Copy, "Copy shapes"),
    ShortcutBinding::new("V", true, false, Shortcut::Paste, "Paste shapes"),
    ShortcutBinding::new("G", true, false, Shortcut::Group, "Group selected shapes"),
    ShortcutBinding::new("G", true, true, Shortcut::Ungroup, "Ungroup selected shapes"),
    ShortcutBinding::new("V", false, false, Shortcut::SelectTool(ToolKind::Select), "Select tool"),
    ShortcutBinding::new("H", false, false, Shortcut::SelectTool(ToolKind::Hand), "Hand tool"),
    ShortcutBinding::new("R", false, false, Shortcut::SelectTool(ToolKind::Rectangle), "Rectangle tool"),
    ShortcutBinding::new("O", false, false, Shortcut::SelectTool(ToolKind::Ellipse), "Ellipse tool"),
    ShortcutBinding::new("L", false, false, Shortcut::SelectTool(ToolKind::Line), "Line tool"),
    ShortcutBinding::new("P", false, false, Shortcut::SelectTool(ToolKind::Freehand), "Pencil tool"),
    ShortcutBinding::new("T", false, false, Shortcut::SelectTool(ToolKind::Text), "Text tool"),
    ShortcutBinding::new("X", false, false, Shortcut::SelectTool(ToolKind::Eraser), "Eraser tool"),
    ShortcutBinding::new("/", false, false, Shortcut::OpenChat, "Open cursor chat"),
    ShortcutBinding::new("Escape", false, false, Shortcut::CloseChat, "Close cursor chat"),
    ShortcutBinding::new("E", false, false, Shortcut::OpenReactionPicker, "Open reaction picker"),
];

impl Shortcut {
    /// Resolve a key press to its bound action.
    pub fn from_key(input: &KeyInput) -> Option<Shortcut> {
        BINDINGS
            .iter()
            .find(|binding| binding.matches(input))
            .map(|binding| binding.action)
    }
}

/// Registry of all keyboard shortcuts.
pub struct ShortcutRegistry;

impl ShortcutRegistry {
    /// Get all registered shortcuts.
    pub fn all() -> &'static [ShortcutBinding] {
        BINDINGS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;

    #[test]
    fn test_undo_redo_bindings() {
        let undo = KeyInput::with_modifiers("z", Modifiers::NONE.with_ctrl());
        assert_eq!(Shortcut::from_key(&undo), Some(Shortcut::Undo));

        let redo = KeyInput::with_modifiers("Z", Modifiers::NONE.with_meta().with_shift());
        assert_eq!(Shortcut::from_key(&redo), Some(Shortcut::Redo));

        let redo_y = KeyInput::with_modifiers("y", Modifiers::NONE.with_ctrl());
        assert_eq!(Shortcut::from_key(&redo_y), Some(Shortcut::Redo));
    }

    #[test]
    fn test_plain_letters_pick_tools() {
        assert_eq!(
            Shortcut::from_key(&KeyInput::new("r")),
            Some(Shortcut::SelectTool(ToolKind::Rectangle))
        );
        // Ctrl+V pastes, plain v selects.
        assert_eq!(
            Shortcut::from_key(&KeyInput::new("v")),
            Some(Shortcut::SelectTool(ToolKind::Select))
        );
        assert_eq!(
            Shortcut::from_key(&KeyInput::with_modifiers("v", Modifiers::NONE.with_ctrl())),
            Some(Shortcut::Paste)
        );
    }

    #[test]
    fn test_presence_keys() {
        assert_eq!(Shortcut::from_key(&KeyInput::new("/")), Some(Shortcut::OpenChat));
        assert_eq!(Shortcut::from_key(&KeyInput::new("Escape")), Some(Shortcut::CloseChat));
        assert_eq!(
            Shortcut::from_key(&KeyInput::new("e")),
            Some(Shortcut::OpenReactionPicker)
        );
    }

    #[test]
    fn test_unbound_key() {
        assert_eq!(Shortcut::from_key(&KeyInput::new("q")), None);
        assert_eq!(ShortcutRegistry::all()[2].format(), "Ctrl+Z");
    }
}

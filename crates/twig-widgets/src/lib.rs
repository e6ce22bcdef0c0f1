//! Widgets built on the twig core: buttons, floating menus, scroll
//! viewports, and a single-line text editor.

pub mod button;
pub mod editstate;
pub mod menu;
pub mod scroll;
pub mod textedit;

pub use button::{Button, setup_menu_item};
pub use editstate::{EditBuffer, EditState, Motion};
pub use menu::{Menu, MenuAlign};
pub use scroll::{ScrollArea, ScrollGesture, ScrollOp, ScrollPhase};
pub use textedit::{EditMode, TextEdit};

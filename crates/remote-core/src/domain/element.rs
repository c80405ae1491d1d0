//! Remote elements: the nodes of an on-screen remote layout.
//!
//! A remote is a tree.  The root is an element of kind [`ElementKind::Remote`],
//! its children are usually button groups and their children are buttons.  The
//! tree itself (child order, parent back-reference) and every layout
//! constraint live in [`crate::domain::graph::ElementGraph`]; this module only
//! defines the per-node attributes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the mode every element falls back to.
pub const DEFAULT_MODE: &str = "default";

/// Stable identifier of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// The string used as the metrics key and as the default name in format
    /// strings: an underscore followed by the hyphen-less UUID.
    pub fn identifier(&self) -> String {
        format!("_{}", self.0.simple())
    }

    /// Parses either the hyphenated UUID or the `_`-prefixed identifier form.
    pub fn parse(s: &str) -> Option<Self> {
        let raw = s.strip_prefix('_').unwrap_or(s);
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of node an element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Remote,
    ButtonGroup,
    Button,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Remote => "remote",
            ElementKind::ButtonGroup => "button-group",
            ElementKind::Button => "button",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "remote" => Some(ElementKind::Remote),
            "button-group" => Some(ElementKind::ButtonGroup),
            "button" => Some(ElementKind::Button),
            _ => None,
        }
    }
}

/// Outline drawn for an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    #[default]
    Undefined,
    RoundedRectangle,
    Oval,
    Rectangle,
    Triangle,
    Diamond,
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Undefined => "undefined",
            Shape::RoundedRectangle => "rounded-rectangle",
            Shape::Oval => "oval",
            Shape::Rectangle => "rectangle",
            Shape::Triangle => "triangle",
            Shape::Diamond => "diamond",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "rounded-rectangle" => Shape::RoundedRectangle,
            "oval" => Shape::Oval,
            "rectangle" => Shape::Rectangle,
            "triangle" => Shape::Triangle,
            "diamond" => Shape::Diamond,
            _ => Shape::Undefined,
        }
    }
}

/// Drawing style bits.
///
/// The gloss variants share the `APPLY_GLOSS` bit and differ in bits 3–5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Style(u8);

impl Style {
    pub const NONE: Style = Style(0);
    pub const APPLY_GLOSS: Style = Style(0b0000_0001);
    pub const DRAW_BORDER: Style = Style(0b0000_0010);
    pub const STRETCHABLE: Style = Style(0b0000_0100);
    pub const GLOSS_STYLE_1: Style = Style::APPLY_GLOSS;
    pub const GLOSS_STYLE_2: Style = Style(0b0000_1001);
    pub const GLOSS_STYLE_3: Style = Style(0b0001_0001);
    pub const GLOSS_STYLE_4: Style = Style(0b0010_0001);
    const GLOSS_MASK: u8 = 0b0011_1001;
    const VALID: u8 = 0b0011_1111;

    pub fn from_bits(bits: u8) -> Self {
        Style(bits & Self::VALID)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: Style) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parses a space-separated list such as `"border gloss2"`.
    pub fn parse(s: &str) -> Self {
        s.split_whitespace().fold(Style::NONE, |style, word| {
            let bits = match word {
                "border" => Style::DRAW_BORDER.0,
                "stretchable" => Style::STRETCHABLE.0,
                "gloss" | "gloss1" => Style::GLOSS_STYLE_1.0,
                "gloss2" => Style::GLOSS_STYLE_2.0,
                "gloss3" => Style::GLOSS_STYLE_3.0,
                "gloss4" => Style::GLOSS_STYLE_4.0,
                _ => 0,
            };
            Style(style.0 | bits)
        })
    }

    /// Inverse of [`Style::parse`].
    pub fn describe(&self) -> String {
        let mut words = Vec::new();
        if self.contains(Style::DRAW_BORDER) {
            words.push("border");
        }
        if self.contains(Style::STRETCHABLE) {
            words.push("stretchable");
        }
        match self.0 & Self::GLOSS_MASK {
            0b0000_0001 => words.push("gloss1"),
            0b0000_1001 => words.push("gloss2"),
            0b0001_0001 => words.push("gloss3"),
            0b0010_0001 => words.push("gloss4"),
            _ => {}
        }
        words.join(" ")
    }
}

/// Semantic role of an element inside its group (dpad arrow, number key, ...).
///
/// The low bits identify the family (shared with the owning group's role), the
/// high bits pick the member of that family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(u8);

impl Role {
    pub const UNDEFINED: Role = Role(0);

    pub const SELECTION_PANEL: Role = Role(0b0000_0011);
    pub const TOOLBAR: Role = Role(0b0000_0010);
    pub const DPAD: Role = Role(0b0000_0100);
    pub const NUMBERPAD: Role = Role(0b0000_0110);
    pub const TRANSPORT: Role = Role(0b0000_1000);
    pub const ROCKER: Role = Role(0b0000_1010);

    pub const CONNECTION_STATUS: Role = Role(0b0001_0010);
    pub const BATTERY_STATUS: Role = Role(0b0010_0010);
    pub const TOP: Role = Role(0b0001_1010);
    pub const BOTTOM: Role = Role(0b0010_1010);
    pub const PANEL_BUTTON: Role = Role(0b0000_0001);
    pub const TUCK: Role = Role(0b0001_0001);
    pub const UP: Role = Role(0b0001_0100);
    pub const DOWN: Role = Role(0b0010_0100);
    pub const LEFT: Role = Role(0b0011_0100);
    pub const RIGHT: Role = Role(0b0100_0100);
    pub const CENTER: Role = Role(0b0101_0100);
    pub const ONE: Role = Role(0b0001_0110);
    pub const TWO: Role = Role(0b0010_0110);
    pub const THREE: Role = Role(0b0011_0110);
    pub const FOUR: Role = Role(0b0100_0110);
    pub const FIVE: Role = Role(0b0101_0110);
    pub const SIX: Role = Role(0b0111_0110);
    pub const SEVEN: Role = Role(0b1000_0110);
    pub const EIGHT: Role = Role(0b1001_0110);
    pub const NINE: Role = Role(0b1010_0110);
    pub const ZERO: Role = Role(0b1011_0110);
    pub const AUX1: Role = Role(0b1100_0110);
    pub const AUX2: Role = Role(0b1100_1110);
    pub const PLAY: Role = Role(0b0001_1000);
    pub const STOP: Role = Role(0b0010_1000);
    pub const PAUSE: Role = Role(0b0011_1000);
    pub const SKIP: Role = Role(0b0100_1000);
    pub const REPLAY: Role = Role(0b0101_1000);
    pub const FAST_FORWARD: Role = Role(0b0111_1000);
    pub const REWIND: Role = Role(0b1000_1000);
    pub const RECORD: Role = Role(0b1001_1000);

    const NAMES: &'static [(&'static str, Role)] = &[
        ("selection-panel", Role::SELECTION_PANEL),
        ("toolbar", Role::TOOLBAR),
        ("dpad", Role::DPAD),
        ("numberpad", Role::NUMBERPAD),
        ("transport", Role::TRANSPORT),
        ("rocker", Role::ROCKER),
        ("connection-status", Role::CONNECTION_STATUS),
        ("battery-status", Role::BATTERY_STATUS),
        ("top", Role::TOP),
        ("bottom", Role::BOTTOM),
        ("panel", Role::PANEL_BUTTON),
        ("tuck", Role::TUCK),
        ("up", Role::UP),
        ("down", Role::DOWN),
        ("left", Role::LEFT),
        ("right", Role::RIGHT),
        ("center", Role::CENTER),
        ("one", Role::ONE),
        ("two", Role::TWO),
        ("three", Role::THREE),
        ("four", Role::FOUR),
        ("five", Role::FIVE),
        ("six", Role::SIX),
        ("seven", Role::SEVEN),
        ("eight", Role::EIGHT),
        ("nine", Role::NINE),
        ("zero", Role::ZERO),
        ("aux1", Role::AUX1),
        ("aux2", Role::AUX2),
        ("play", Role::PLAY),
        ("stop", Role::STOP),
        ("pause", Role::PAUSE),
        ("skip", Role::SKIP),
        ("replay", Role::REPLAY),
        ("fast-forward", Role::FAST_FORWARD),
        ("rewind", Role::REWIND),
        ("record", Role::RECORD),
    ];

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_name(name: &str) -> Self {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, r)| *r)
            .unwrap_or(Role::UNDEFINED)
    }

    pub fn name(&self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, r)| r == self)
            .map(|(n, _)| *n)
            .unwrap_or("undefined")
    }
}

/// Which theme attributes the element overrides locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeFlags(u16);

impl ThemeFlags {
    pub const NONE: ThemeFlags = ThemeFlags(0);
    pub const NO_BACKGROUND: ThemeFlags = ThemeFlags(1 << 0);
    pub const NO_BORDER: ThemeFlags = ThemeFlags(1 << 1);
    pub const NO_GLOSS: ThemeFlags = ThemeFlags(1 << 2);
    pub const NO_STRETCHABLE: ThemeFlags = ThemeFlags(1 << 3);
    pub const NO_ICON: ThemeFlags = ThemeFlags(1 << 4);
    pub const NO_TITLE: ThemeFlags = ThemeFlags(1 << 5);

    pub fn contains(&self, other: ThemeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ThemeFlags) {
        self.0 |= other.0;
    }
}

/// RGBA colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const CLEAR: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Parses `#rrggbb`, `#rrggbbaa` or one of a few named colours.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "black" => return Some(Color::BLACK),
            "white" => return Some(Color::WHITE),
            "clear" => return Some(Color::CLEAR),
            "gray" | "grey" => return Some(Color::rgba(0.5, 0.5, 0.5, 1.0)),
            _ => {}
        }
        let hex = s.strip_prefix('#')?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return None;
        }
        let component = |i: usize| -> Option<f32> {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .ok()
                .map(|v| f32::from(v) / 255.0)
        };
        let alpha = if hex.len() == 8 { component(6)? } else { 1.0 };
        Some(Color::rgba(component(0)?, component(2)?, component(4)?, alpha))
    }

    /// `#rrggbbaa` form of the colour.
    pub fn to_hex(&self) -> String {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}{:02x}",
            byte(self.red),
            byte(self.green),
            byte(self.blue),
            byte(self.alpha)
        )
    }
}

/// Per-mode visual settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeConfiguration {
    pub background_color: Option<Color>,
    pub background_image_alpha: Option<f32>,
}

/// One node of the remote tree.
///
/// Tree links and constraints are kept by the owning graph, so this struct is
/// plain data and cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteElement {
    pub id: ElementId,
    pub kind: ElementKind,
    pub name: String,
    /// Optional short key used to refer to the element in format strings.
    pub key: Option<String>,
    pub role: Role,
    pub shape: Shape,
    pub style: Style,
    pub theme_flags: ThemeFlags,
    /// When set, the element's bounds follow its children's union frame.
    pub shrink_wrap: bool,
    pub(crate) configurations: BTreeMap<String, ModeConfiguration>,
    pub(crate) current_mode: String,
    pub(crate) parent: Option<ElementId>,
    pub(crate) subelements: Vec<ElementId>,
}

impl RemoteElement {
    pub fn new(kind: ElementKind, name: impl Into<String>) -> Self {
        Self::with_id(ElementId::new(), kind, name)
    }

    pub fn with_id(id: ElementId, kind: ElementKind, name: impl Into<String>) -> Self {
        let mut configurations = BTreeMap::new();
        configurations.insert(DEFAULT_MODE.to_string(), ModeConfiguration::default());
        Self {
            id,
            kind,
            name: name.into(),
            key: None,
            role: Role::UNDEFINED,
            shape: Shape::Undefined,
            style: Style::NONE,
            theme_flags: ThemeFlags::NONE,
            shrink_wrap: false,
            configurations,
            current_mode: DEFAULT_MODE.to_string(),
            parent: None,
            subelements: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn identifier(&self) -> String {
        self.id.identifier()
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Children in z-order.
    pub fn subelements(&self) -> &[ElementId] {
        &self.subelements
    }

    /// Returns `true` when `name` is this element's identifier, UUID or key.
    pub fn is_identified_by(&self, name: &str) -> bool {
        if self.key.as_deref() == Some(name) || self.identifier() == name {
            return true;
        }
        ElementId::parse(name) == Some(self.id)
    }

    // ── Modes ────────────────────────────────────────────────────────────────

    pub fn current_mode(&self) -> &str {
        &self.current_mode
    }

    pub fn has_mode(&self, mode: &str) -> bool {
        self.configurations.contains_key(mode)
    }

    /// Adds `mode` as a copy of the default configuration.  Existing modes are
    /// left alone.
    pub fn add_mode(&mut self, mode: &str) {
        if !self.configurations.contains_key(mode) {
            let base = self.default_configuration().clone();
            self.configurations.insert(mode.to_string(), base);
        }
    }

    pub fn modes(&self) -> impl Iterator<Item = &str> {
        self.configurations.keys().map(String::as_str)
    }

    /// Switches to `mode`, falling back to the default mode when the element
    /// has no configuration for it.  Returns the mode actually selected.
    pub fn set_current_mode(&mut self, mode: &str) -> &str {
        self.current_mode = if self.has_mode(mode) {
            mode.to_string()
        } else {
            DEFAULT_MODE.to_string()
        };
        &self.current_mode
    }

    fn default_configuration(&self) -> &ModeConfiguration {
        static EMPTY: ModeConfiguration = ModeConfiguration {
            background_color: None,
            background_image_alpha: None,
        };
        self.configurations.get(DEFAULT_MODE).unwrap_or(&EMPTY)
    }

    /// Configuration of the current mode, or the default mode's.
    pub fn configuration(&self) -> &ModeConfiguration {
        self.configurations
            .get(&self.current_mode)
            .unwrap_or_else(|| self.default_configuration())
    }

    pub fn configuration_for_mode(&self, mode: &str) -> Option<&ModeConfiguration> {
        self.configurations.get(mode)
    }

    /// Mutable configuration for `mode`, creating it when absent.
    pub fn configuration_mut(&mut self, mode: &str) -> &mut ModeConfiguration {
        self.add_mode(mode);
        self.configurations
            .entry(mode.to_string())
            .or_default()
    }

    /// Background colour in the current mode, falling back to the default mode.
    pub fn background_color(&self) -> Option<Color> {
        self.configuration()
            .background_color
            .or(self.default_configuration().background_color)
    }

    pub fn set_background_color(&mut self, mode: &str, color: Option<Color>) {
        self.configuration_mut(mode).background_color = color;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

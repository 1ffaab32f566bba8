//! Structure templates and placed structure instances
//!
//! A [`StructureTemplate`] is an immutable blueprint shared by every instance
//! through an `Arc`. Footprint dimensions are always derived from the blueprint
//! itself; there is no separately supplied width/height that could disagree.

use std::sync::Arc;

use ahash::AHashMap;
use glam::IVec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a placed structure, unique within one world session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(pub u32);

/// Errors raised when a blueprint cannot describe a valid structure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{0}' has no blueprint rows")]
    NoRows(String),

    #[error("template '{id}' row {row} is empty")]
    ZeroWidth { id: String, row: usize },

    #[error("template '{id}' row {row} has width {found}, expected {expected}")]
    RaggedRow {
        id: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("template '{id}' uses unknown blueprint glyph '{glyph}'")]
    UnknownGlyph { id: String, glyph: char },

    #[error("template '{id}' decoration at ({x}, {y}) lies outside its blueprint")]
    DecorationOutOfBounds { id: String, x: i32, y: i32 },
}

/// Component tags a blueprint cell or decoration can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentTag {
    Wall,
    Door,
    Window,
    Floor,
    Pillar,
    Counter,
    Trunk,
    Chimney,
    Lamp,
    Canopy,
}

impl ComponentTag {
    /// Blueprint glyph for this tag
    pub fn glyph(self) -> char {
        match self {
            ComponentTag::Wall => 'W',
            ComponentTag::Door => 'D',
            ComponentTag::Window => 'N',
            ComponentTag::Floor => 'F',
            ComponentTag::Pillar => 'P',
            ComponentTag::Counter => 'S',
            ComponentTag::Trunk => 'T',
            ComponentTag::Chimney => 'C',
            ComponentTag::Lamp => 'L',
            ComponentTag::Canopy => 'A',
        }
    }

    pub fn from_glyph(glyph: char) -> Option<Self> {
        let tag = match glyph {
            'W' => ComponentTag::Wall,
            'D' => ComponentTag::Door,
            'N' => ComponentTag::Window,
            'F' => ComponentTag::Floor,
            'P' => ComponentTag::Pillar,
            'S' => ComponentTag::Counter,
            'T' => ComponentTag::Trunk,
            'C' => ComponentTag::Chimney,
            'L' => ComponentTag::Lamp,
            'A' => ComponentTag::Canopy,
            _ => return None,
        };
        Some(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialKind {
    Wood,
    Stone,
    Brick,
    Foliage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoofStyle {
    None,
    Flat,
    Gabled,
    Thatched,
    Conical,
    Awning,
}

/// Decoration overlay at a blueprint-relative offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDecoration {
    pub tag: ComponentTag,
    pub offset: (i32, i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureTemplate {
    id: String,
    /// Row-major blueprint; every row has the same width
    blueprint: Vec<Vec<ComponentTag>>,
    decorations: Vec<TemplateDecoration>,
    material: MaterialKind,
    roof: RoofStyle,
    /// Solid structures occlude; non-blocking ones (trees) sort behind them
    blocking: bool,
}

impl StructureTemplate {
    /// Build a template, rejecting malformed blueprints
    pub fn new(
        id: impl Into<String>,
        blueprint: Vec<Vec<ComponentTag>>,
        decorations: Vec<TemplateDecoration>,
        material: MaterialKind,
        roof: RoofStyle,
        blocking: bool,
    ) -> Result<Self, TemplateError> {
        let id = id.into();
        let Some(first) = blueprint.first() else {
            return Err(TemplateError::NoRows(id));
        };
        let expected = first.len();

        for (row, cells) in blueprint.iter().enumerate() {
            if cells.is_empty() {
                return Err(TemplateError::ZeroWidth { id, row });
            }
            if cells.len() != expected {
                return Err(TemplateError::RaggedRow {
                    id,
                    row,
                    expected,
                    found: cells.len(),
                });
            }
        }

        let (width, height) = (expected as i32, blueprint.len() as i32);
        for decoration in &decorations {
            let (x, y) = decoration.offset;
            if !(0..width).contains(&x) || !(0..height).contains(&y) {
                return Err(TemplateError::DecorationOutOfBounds { id, x, y });
            }
        }

        Ok(Self {
            id,
            blueprint,
            decorations,
            material,
            roof,
            blocking,
        })
    }

    /// Build a template from glyph rows such as `["WDW", "NFN", "WWW"]`
    pub fn from_rows(
        id: impl Into<String>,
        rows: &[&str],
        decorations: Vec<TemplateDecoration>,
        material: MaterialKind,
        roof: RoofStyle,
        blocking: bool,
    ) -> Result<Self, TemplateError> {
        let id = id.into();
        let blueprint = parse_rows(&id, rows.iter().copied())?;
        Self::new(id, blueprint, decorations, material, roof, blocking)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Footprint width, derived from the blueprint
    pub fn width(&self) -> i32 {
        self.blueprint[0].len() as i32
    }

    /// Footprint height, derived from the blueprint
    pub fn height(&self) -> i32 {
        self.blueprint.len() as i32
    }

    pub fn cell(&self, col: i32, row: i32) -> Option<ComponentTag> {
        let row = self.blueprint.get(usize::try_from(row).ok()?)?;
        row.get(usize::try_from(col).ok()?).copied()
    }

    pub fn decorations(&self) -> &[TemplateDecoration] {
        &self.decorations
    }

    pub fn material(&self) -> MaterialKind {
        self.material
    }

    pub fn roof(&self) -> RoofStyle {
        self.roof
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Whether any blueprint cell or decoration carries `tag`
    pub fn has_component(&self, tag: ComponentTag) -> bool {
        self.blueprint.iter().flatten().any(|&t| t == tag)
            || self.decorations.iter().any(|d| d.tag == tag)
    }

    /// Blueprint rows rendered back to glyphs
    pub fn rows(&self) -> Vec<String> {
        self.blueprint
            .iter()
            .map(|row| row.iter().map(|t| t.glyph()).collect())
            .collect()
    }
}

fn parse_rows<'a>(
    id: &str,
    rows: impl Iterator<Item = &'a str>,
) -> Result<Vec<Vec<ComponentTag>>, TemplateError> {
    rows.map(|row| {
        row.chars()
            .map(|glyph| {
                ComponentTag::from_glyph(glyph).ok_or_else(|| TemplateError::UnknownGlyph {
                    id: id.to_string(),
                    glyph,
                })
            })
            .collect()
    })
    .collect()
}

/// Serializable template definition (RON), validated on conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
    pub id: String,
    pub blueprint: Vec<String>,
    #[serde(default)]
    pub decorations: Vec<TemplateDecoration>,
    pub material: MaterialKind,
    pub roof: RoofStyle,
    #[serde(default = "default_blocking")]
    pub blocking: bool,
}

fn default_blocking() -> bool {
    true
}

impl TryFrom<TemplateDef> for StructureTemplate {
    type Error = TemplateError;

    fn try_from(def: TemplateDef) -> Result<Self, Self::Error> {
        let blueprint = parse_rows(&def.id, def.blueprint.iter().map(String::as_str))?;
        StructureTemplate::new(
            def.id,
            blueprint,
            def.decorations,
            def.material,
            def.roof,
            def.blocking,
        )
    }
}

/// Registry of shared templates, keyed by id
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: AHashMap<String, Arc<StructureTemplate>>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with the built-in templates
    pub fn with_builtins() -> Result<Self, TemplateError> {
        let mut library = Self::new();
        for template in builtin_templates()? {
            library.register(template);
        }
        Ok(library)
    }

    /// Register a template, replacing any previous one with the same id
    pub fn register(&mut self, template: StructureTemplate) -> Arc<StructureTemplate> {
        let template = Arc::new(template);
        self.templates
            .insert(template.id().to_string(), Arc::clone(&template));
        template
    }

    /// Parse a RON list of [`TemplateDef`]s and register them all
    pub fn register_ron(&mut self, source: &str) -> anyhow::Result<usize> {
        let defs: Vec<TemplateDef> = ron::from_str(source)?;
        let count = defs.len();
        for def in defs {
            self.register(StructureTemplate::try_from(def)?);
        }
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<Arc<StructureTemplate>> {
        self.templates.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

fn builtin_templates() -> Result<Vec<StructureTemplate>, TemplateError> {
    let deco = |tag, x, y| TemplateDecoration {
        tag,
        offset: (x, y),
    };
    Ok(vec![
        StructureTemplate::from_rows(
            "cottage",
            &["WD", "NW"],
            vec![deco(ComponentTag::Chimney, 1, 1)],
            MaterialKind::Wood,
            RoofStyle::Thatched,
            true,
        )?,
        StructureTemplate::from_rows(
            "house",
            &["WDW", "NFN", "WWW"],
            vec![
                deco(ComponentTag::Chimney, 2, 2),
                deco(ComponentTag::Lamp, 1, 0),
            ],
            MaterialKind::Brick,
            RoofStyle::Gabled,
            true,
        )?,
        StructureTemplate::from_rows(
            "watchtower",
            &["PP", "PD"],
            vec![deco(ComponentTag::Lamp, 0, 0)],
            MaterialKind::Stone,
            RoofStyle::Conical,
            true,
        )?,
        StructureTemplate::from_rows(
            "market_stall",
            &["SSS"],
            vec![deco(ComponentTag::Canopy, 1, 0)],
            MaterialKind::Wood,
            RoofStyle::Awning,
            true,
        )?,
        StructureTemplate::from_rows(
            "oak_tree",
            &["T"],
            vec![deco(ComponentTag::Canopy, 0, 0)],
            MaterialKind::Foliage,
            RoofStyle::None,
            false,
        )?,
        StructureTemplate::from_rows(
            "pine_tree",
            &["T"],
            Vec::new(),
            MaterialKind::Foliage,
            RoofStyle::None,
            false,
        )?,
    ])
}

/// One tile-level component of a placed structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureComponent {
    /// Absolute grid position
    pub position: IVec2,
    pub tag: ComponentTag,
    /// Overlay from the template's decoration list rather than a blueprint cell
    pub decorative: bool,
    /// Row-major blueprint index (row * width + col)
    pub footprint_index: u32,
}

/// Persisted interactive state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructureState {
    pub door_open: bool,
    pub light_on: bool,
    pub smoke_active: bool,
}

/// Animation phases in [0, 1]; not persisted
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnimationPhases {
    /// 0 = closed, 1 = fully open
    pub door: f32,
    pub smoke: f32,
    pub flicker: f32,
}

const DOOR_SWING_PER_SEC: f32 = 2.5;
const SMOKE_CYCLE_PER_SEC: f32 = 0.4;
const FLICKER_CYCLE_PER_SEC: f32 = 3.0;

/// A structure placed in the world
#[derive(Debug, Clone)]
pub struct Structure {
    id: StructureId,
    template: Arc<StructureTemplate>,
    origin: IVec2,
    width: i32,
    height: i32,
    components: Vec<StructureComponent>,
    pub state: StructureState,
    pub phases: AnimationPhases,
}

impl Structure {
    /// Instantiate a template with its top-left footprint cell at `origin`
    pub(crate) fn new(id: StructureId, template: Arc<StructureTemplate>, origin: IVec2) -> Self {
        let width = template.width();
        let height = template.height();

        let mut components = Vec::with_capacity((width * height) as usize);
        for row in 0..height {
            for col in 0..width {
                if let Some(tag) = template.cell(col, row) {
                    components.push(StructureComponent {
                        position: origin + IVec2::new(col, row),
                        tag,
                        decorative: false,
                        footprint_index: (row * width + col) as u32,
                    });
                }
            }
        }
        for decoration in template.decorations() {
            let (col, row) = decoration.offset;
            components.push(StructureComponent {
                position: origin + IVec2::new(col, row),
                tag: decoration.tag,
                decorative: true,
                footprint_index: (row * width + col) as u32,
            });
        }

        let state = StructureState {
            smoke_active: template.has_component(ComponentTag::Chimney),
            ..StructureState::default()
        };

        Self {
            id,
            template,
            origin,
            width,
            height,
            components,
            state,
            phases: AnimationPhases::default(),
        }
    }

    pub fn id(&self) -> StructureId {
        self.id
    }

    pub fn template(&self) -> &Arc<StructureTemplate> {
        &self.template
    }

    /// Top-left footprint cell
    pub fn origin(&self) -> IVec2 {
        self.origin
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn components(&self) -> &[StructureComponent] {
        &self.components
    }

    /// Blueprint cells only (one per occupied tile)
    pub fn footprint(&self) -> impl Iterator<Item = &StructureComponent> {
        self.components.iter().filter(|c| !c.decorative)
    }

    /// Inclusive grid bounds recorded at creation
    pub fn bounds(&self) -> (IVec2, IVec2) {
        (
            self.origin,
            self.origin + IVec2::new(self.width - 1, self.height - 1),
        )
    }

    pub fn contains(&self, grid: IVec2) -> bool {
        self.footprint().any(|c| c.position == grid)
    }

    pub fn is_blocking(&self) -> bool {
        self.template.is_blocking()
    }

    /// Solid structures sort by their far corner, non-blocking ones by their origin
    pub fn depth_key(&self) -> i64 {
        let (x, y) = (self.origin.x as i64, self.origin.y as i64);
        if self.is_blocking() {
            (x + self.width as i64) + (y + self.height as i64)
        } else {
            x + y
        }
    }

    /// Toggle the door; returns false when the structure has no door
    pub fn toggle_door(&mut self) -> bool {
        if !self.template.has_component(ComponentTag::Door) {
            return false;
        }
        self.state.door_open = !self.state.door_open;
        true
    }

    /// Toggle the light; requires a lamp or a window
    pub fn toggle_light(&mut self) -> bool {
        if !(self.template.has_component(ComponentTag::Lamp)
            || self.template.has_component(ComponentTag::Window))
        {
            return false;
        }
        self.state.light_on = !self.state.light_on;
        true
    }

    /// Start or stop chimney smoke; requires a chimney
    pub fn set_smoke(&mut self, active: bool) -> bool {
        if !self.template.has_component(ComponentTag::Chimney) {
            return false;
        }
        self.state.smoke_active = active;
        true
    }

    /// Advance animation phases by `dt` seconds
    pub fn advance_animation(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let target = if self.state.door_open { 1.0 } else { 0.0 };
        let step = DOOR_SWING_PER_SEC * dt;
        self.phases.door = if self.phases.door < target {
            (self.phases.door + step).min(target)
        } else {
            (self.phases.door - step).max(target)
        };

        if self.state.smoke_active {
            self.phases.smoke = (self.phases.smoke + SMOKE_CYCLE_PER_SEC * dt).fract();
        }
        if self.state.light_on {
            self.phases.flicker = (self.phases.flicker + FLICKER_CYCLE_PER_SEC * dt).fract();
        }
    }

    pub fn to_record(&self) -> StructureRecord {
        StructureRecord {
            template_id: self.template.id().to_string(),
            origin_x: self.origin.x,
            origin_y: self.origin.y,
            state: self.state,
        }
    }
}

/// Persisted form of a structure, stored with the chunk holding its origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub template_id: String,
    pub origin_x: i32,
    pub origin_y: i32,
    pub state: StructureState,
}

impl StructureRecord {
    pub fn origin(&self) -> IVec2 {
        IVec2::new(self.origin_x, self.origin_y)
    }
}

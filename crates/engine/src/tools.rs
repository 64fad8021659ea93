//! Mapping between the engine's tool names and store tool types.

use dicomark_core::annotation::ToolType;

/// Engine tool names paired with the tool type they produce.
pub const TOOL_NAMES: [(&str, ToolType); 10] = [
    ("Length", ToolType::Length),
    ("RectangleROI", ToolType::Rectangle),
    ("EllipticalROI", ToolType::Ellipse),
    ("SplineROI", ToolType::Polygon),
    ("PlanarFreehandROI", ToolType::Freehand),
    ("Angle", ToolType::Angle),
    ("Probe", ToolType::Probe),
    ("Bidirectional", ToolType::Bidirectional),
    ("CircleROI", ToolType::CircleRoi),
    ("ArrowAnnotate", ToolType::Arrow),
];

/// Tool type for an engine tool name, `None` if the name is not in the table.
pub fn tool_type_for(engine_tool_name: &str) -> Option<ToolType> {
    TOOL_NAMES
        .iter()
        .find(|(name, _)| *name == engine_tool_name)
        .map(|(_, tool)| *tool)
}

/// Engine tool name that draws `tool`.
pub fn engine_tool_name(tool: ToolType) -> &'static str {
    TOOL_NAMES
        .iter()
        .find(|(_, t)| *t == tool)
        .map(|(name, _)| *name)
        .unwrap_or("Length")
}

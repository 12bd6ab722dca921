//! Scene graph → script compiler.

mod nodes;
mod script;

pub use nodes::{normalize_scene, ChoiceOption, SceneNode};
pub use script::{
    quote, scene_warnings, CompiledScene, RenderedScript, ScriptModule, ScriptPlan, ScriptRenderer,
};

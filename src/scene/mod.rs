/// Scene Module - Data-Oriented Programming (DOP) style
///
/// The model builder: compresses geometry, routes meshes into layers keyed by
/// primitive, texture set and RTC cell, and drives the frame and camera
/// hooks of everything it created.
///
/// - scene_data.rs: model, mesh placement and request types
/// - scene_operations.rs: the builder and per-mesh passthroughs

pub mod scene_data;
pub mod scene_operations;

pub use scene_data::{SceneGeometry, SceneMesh, SceneMeshParams, SceneModelData, SceneState, SceneStats};
pub use scene_operations::{
    begin_frame, create_geometry, create_scene_mesh, create_scene_model, destroy_scene_model,
    end_frame, finalize, on_camera_changed, scene_stats, set_mesh_color, set_mesh_flags,
    set_mesh_matrix, set_mesh_pick_color,
};

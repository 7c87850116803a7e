//! Shared scene API for MercuryEngine.
//! Defines camera/light handles and the [`SceneManager`] trait so compositor passes can cull,
//! render and dispatch compute work without knowing the scene implementation.

mod scene;
pub mod recording;

pub use scene::{
    CameraId, ComputeDispatch, LightId, SceneManager, SceneRenderRequest, ShadowCameraSetup,
    ShadowMapTechnique,
};

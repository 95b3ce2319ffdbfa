//! CPU rendering primitives: premultiplied-RGBA8 [`surface::Surface`]s, the
//! [`surface::FramePair`] double buffer, and the pixel compositing used by
//! slide transitions. No renderer performs IO.

pub mod composite;
pub mod surface;

pub mod box_shape;
pub mod capsule;
pub mod collidable;
pub mod collidable_reference;
pub mod compound;
pub mod shapes;
pub mod sphere;
pub mod typed_index;

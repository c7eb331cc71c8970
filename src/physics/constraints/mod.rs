pub mod contact_constraint;
pub mod spring_settings;
pub mod type_batch;
pub mod volume_constraint;

pub mod backup_types;
pub mod deployment_types;

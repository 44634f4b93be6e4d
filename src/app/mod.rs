pub mod connectivity;
pub mod events;
pub mod friendship;
pub mod moisture;
pub mod oob;
pub mod ports;
pub mod service;
pub mod settings;
pub mod toast;

// Domain layer: core models and ports (interfaces). No protocol or desktop code here.

pub mod model;
pub mod ports;

//! Responsable pédagogique registries.

pub mod classes;
pub mod cours;
pub mod dashboard;
pub mod professeurs;

pub use classes::{ClassFilter, ClassRegistry, derive_occupancy};
pub use cours::{CourseFilter, CourseRegistry, derive_professor_name};
pub use dashboard::{DashboardStats, dashboard_stats};
pub use professeurs::{ProfessorFilter, ProfessorRegistry};

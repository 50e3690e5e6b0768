pub mod cycles;
pub mod dependents;
pub mod extract;
pub mod paths;
pub mod target;

pub use cycles::{check_cycles, find_cycle, remove_cycles};
pub use dependents::DependentsIndex;
pub use extract::config_dependency_paths;
pub use paths::{canonicalize_permissive, clean_path, join_clean};
pub use target::prune_to_target;

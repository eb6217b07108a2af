pub mod doctor;
pub mod enforce_cross_cluster;
pub mod nearby;
pub mod normalize;
pub mod split;

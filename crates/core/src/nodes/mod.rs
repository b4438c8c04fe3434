pub mod delete_path;
pub mod memory_reclaim;
pub mod video_combine;

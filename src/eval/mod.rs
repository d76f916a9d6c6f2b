pub mod selector;

pub use selector::{clip_frame_by_evalid, find_evalid, EvalCandidate};

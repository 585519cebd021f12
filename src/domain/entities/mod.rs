pub mod attendance;
pub mod embedding_record;
pub mod employee;
pub mod face_embedding;
pub mod match_decision;

pub mod face_extractor_port;

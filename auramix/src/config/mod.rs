mod engine_desc;

pub use engine_desc::EngineDesc;

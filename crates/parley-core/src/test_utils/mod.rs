pub mod mock_llm_server;

pub use mock_llm_server::MockLLMServer;

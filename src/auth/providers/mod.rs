pub mod github_copilot;

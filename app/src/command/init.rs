use std::path::PathBuf;

use flowchat_config::Config;

/// Strategy for initializing the configuration.
///
/// Writes the template config file to the resolved config path
/// (`~/flowchat/config.json` unless overridden).
#[derive(Debug, Clone, Copy)]
pub struct InitStrategy;

impl super::CommandStrategy for InitStrategy {
    type Input = Option<PathBuf>;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config_path = Config::create_config(input.as_deref())?;

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Set workflow.base_url and workflow.api_key for your workflow app");
        println!("   2. For uploads, set storage.access_token (drive.file scope) and storage.folder_id");
        println!("   3. Run 'flowchat chat' to start a conversation");
        println!();
        println!("🔧 Configuration options:");
        println!("   - session.is_rag / session.system_prompt: defaults restored by /reset");
        println!("   - storage.make_public: share uploads with anyone who has the link");
        println!("   - stream: event tags and patterns used to separate answer text from noise");
        println!();
        Ok(())
    }
}

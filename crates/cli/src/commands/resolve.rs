//! `story-harness resolve <test-file>`

use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::Project;

#[derive(Args)]
pub struct ResolveArgs {
    /// Test file, relative to the project root
    pub test_file: PathBuf,

    /// Explicit story file, relative to the test file's directory
    #[arg(long)]
    pub story: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Resolved {
    story_file: PathBuf,
    relative: String,
    module: String,
    stylesheet: String,
    explicit: bool,
}

pub fn execute(args: ResolveArgs, project: &Project) -> anyhow::Result<()> {
    let story = project
        .resolver()?
        .resolve(&args.test_file, args.story.as_deref())?;

    let resolved = Resolved {
        module: story.module_path(),
        stylesheet: story.stylesheet_path(),
        story_file: story.story_file,
        relative: story.relative,
        explicit: story.explicit,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        println!("story:      {}", resolved.story_file.display());
        println!("module:     /{}", resolved.module);
        println!("stylesheet: /{} (if emitted)", resolved.stylesheet);
    }
    Ok(())
}

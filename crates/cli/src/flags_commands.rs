//! CLI commands for the persisted flag sets.
//!
//! These edit the files directly; run them while the panel is stopped or the
//! running process will overwrite the change on its next write.

use {
    anyhow::Result,
    clap::Subcommand,
    wapanel_common::ids::normalize_chat_input,
    wapanel_config::PanelConfig,
    wapanel_sessions::{FlagKind, FlagSets},
};

#[derive(Subcommand)]
pub enum FlagsAction {
    /// List the ids in a flag set, or a summary of all sets.
    List {
        /// triggered, hidden or overrides.
        kind: Option<FlagKind>,
    },
    /// Add a conversation id (or phone number) to a set.
    Add { kind: FlagKind, id: String },
    /// Remove a conversation id (or phone number) from a set.
    Remove { kind: FlagKind, id: String },
}

pub fn handle_flags(action: FlagsAction, config: &PanelConfig) -> Result<()> {
    let data_dir = config.resolved_data_dir();
    let sets = FlagSets::load(&data_dir);
    let qualify = |id: &str| {
        normalize_chat_input(id, &config.default_country_code)
            .ok_or_else(|| anyhow::anyhow!("invalid chat id or number: {id:?}"))
    };

    match action {
        FlagsAction::List { kind: Some(kind) } => {
            for id in sets.get(kind).list() {
                println!("{id}");
            }
        },
        FlagsAction::List { kind: None } => {
            println!("{}", data_dir.display());
            for kind in FlagKind::ALL {
                let set = sets.get(kind);
                println!("  {:<10} {:>5}  {}", kind.as_str(), set.len(), kind.file_name());
            }
        },
        FlagsAction::Add { kind, id } => {
            let id = qualify(&id)?;
            if sets.get(kind).insert(&id)? {
                println!("added {id} to {kind}");
            } else {
                println!("{id} already in {kind}");
            }
        },
        FlagsAction::Remove { kind, id } => {
            let id = qualify(&id)?;
            if sets.get(kind).remove(&id)? {
                println!("removed {id} from {kind}");
            } else {
                println!("{id} not in {kind}");
            }
        },
    }
    Ok(())
}

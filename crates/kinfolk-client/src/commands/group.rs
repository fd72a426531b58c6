//! Group and profile panel commands.

use std::path::PathBuf;

use crate::files;
use crate::shell::Shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupCommand {
    Members,
    DisplayName(String),
    Photo(PathBuf),
    GroupName(String),
    GroupIcon(PathBuf),
}

pub(crate) const HELP: &[&str] = &[
    "/members               list participants",
    "/name <name>           change your display name",
    "/photo <path>          change your profile photo",
    "/group-name <name>     rename the group",
    "/group-icon <path>     change the group icon",
];

/// `None` when `name` is not a group command.
pub(crate) fn parse(name: &str, args: &str) -> Option<Result<GroupCommand, String>> {
    let path = |usage: &str| {
        if args.is_empty() {
            Err(format!("Usage: /{name} {usage}"))
        } else {
            Ok(PathBuf::from(args))
        }
    };
    let command = match name {
        "members" => Ok(GroupCommand::Members),
        "name" => Ok(GroupCommand::DisplayName(args.to_string())),
        "photo" => path("<path>").map(GroupCommand::Photo),
        "group-name" => Ok(GroupCommand::GroupName(args.to_string())),
        "group-icon" => path("<path>").map(GroupCommand::GroupIcon),
        _ => return None,
    };
    Some(command)
}

pub(crate) async fn execute(shell: &mut Shell, command: GroupCommand) {
    let Some(mut group) = shell.group.take() else {
        return;
    };
    shell.clear_notice();

    match command {
        GroupCommand::Members => {
            let outcome = group.refresh_participants().await.map(|p| p.to_vec());
            shell.observe(&outcome);
            match outcome {
                Ok(participants) if participants.is_empty() => {
                    shell.set_notice("Nobody has posted yet.");
                }
                Ok(participants) => {
                    let names: Vec<&str> =
                        participants.iter().map(|p| p.display_name.as_str()).collect();
                    shell.set_notice(format!(
                        "{} participants: {}",
                        participants.len(),
                        names.join(", ")
                    ));
                }
                Err(e) => shell.set_notice(e.user_message()),
            }
        }
        GroupCommand::DisplayName(name) => {
            let outcome = group.update_display_name(&name).await;
            shell.observe(&outcome);
            match outcome {
                Ok(Some(identity)) => {
                    shell.set_notice(format!(
                        "You are now {}.",
                        identity.display_name_or_unknown()
                    ));
                    shell.adopt_identity(identity);
                }
                Ok(None) => {}
                Err(e) => shell.set_notice(e.user_message()),
            }
        }
        GroupCommand::Photo(path) => {
            let outcome = match files::load_attachment(&path).await {
                Ok(file) => group.update_photo(&file).await,
                Err(e) => Err(e),
            };
            shell.observe(&outcome);
            match outcome {
                Ok(identity) => {
                    shell.set_notice("Profile photo updated.");
                    shell.adopt_identity(identity);
                }
                Err(e) => shell.set_notice(e.user_message()),
            }
        }
        GroupCommand::GroupName(name) => {
            if group.rename_group(&name) {
                shell.set_notice(format!("Group renamed to {}.", group.settings().name));
            }
        }
        GroupCommand::GroupIcon(path) => {
            let outcome = match files::load_attachment(&path).await {
                Ok(file) => group.update_group_icon(&file).await,
                Err(e) => Err(e),
            };
            shell.observe(&outcome);
            match outcome {
                Ok(_) => shell.set_notice("Group icon updated."),
                Err(e) => shell.set_notice(e.user_message()),
            }
        }
    }
    shell.group = Some(group);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_commands() {
        assert_eq!(parse("members", ""), Some(Ok(GroupCommand::Members)));
        assert_eq!(
            parse("group-name", "Sharma Parivar"),
            Some(Ok(GroupCommand::GroupName("Sharma Parivar".into())))
        );
        assert!(matches!(parse("photo", ""), Some(Err(_))));
        assert_eq!(parse("delete", "1"), None);
    }
}

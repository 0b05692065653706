use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "phone-quota-server")]
#[command(about = "Hands out phone numbers against per-user quotas")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Print a bearer token signed with JWT_SECRET
    IssueToken {
        /// External user ID carried in the `sub` claim
        user_id: String,

        /// Mark the token as an administrator's
        #[arg(long)]
        admin: bool,

        /// Token lifetime in hours
        #[arg(long, default_value_t = 1)]
        valid_hours: i64,
    },
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_the_default() {
        let cli = Cli::try_parse_from(["phone-quota-server"]).unwrap();
        assert_eq!(cli.command(), &Command::Serve);
    }

    #[test]
    fn test_issue_token_arguments() {
        let cli =
            Cli::try_parse_from(["phone-quota-server", "issue-token", "root", "--admin"]).unwrap();
        assert_eq!(
            cli.command(),
            &Command::IssueToken {
                user_id: "root".to_string(),
                admin: true,
                valid_hours: 1,
            }
        );

        assert!(Cli::try_parse_from(["phone-quota-server", "issue-token"]).is_err());
    }
}

use clap::Parser;
use kriptik::cli::commands::config::ConfigCommands;
use kriptik::cli::commands::report::ReportCommands;
use kriptik::cli::{Cli, Commands};

#[test]
fn test_parse_run_defaults() {
    let cli = temp_env::with_var("USER", Some("ada"), || {
        Cli::try_parse_from(["kriptik", "run", "add a health-check endpoint"])
    })
    .unwrap();

    assert!(!cli.json);
    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.project, "default");
            assert_eq!(args.user, "ada");
            assert_eq!(args.workdir, std::path::PathBuf::from(".kriptik/sandboxes"));
            assert!(args.plan.is_none());
            assert!(!args.keep);
            assert!(args.max_agents.is_none());
        }
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_run_overrides() {
    let cli = Cli::try_parse_from([
        "kriptik",
        "run",
        "create routes/users.ts",
        "--template",
        "./app",
        "--keep",
        "--max-agents",
        "2",
        "--user",
        "grace",
    ])
    .unwrap();

    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.user, "grace");
            assert_eq!(args.template, Some(std::path::PathBuf::from("./app")));
            assert!(args.keep);
            assert_eq!(args.max_agents, Some(2));
        }
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_report_commands() {
    let cli = Cli::try_parse_from(["kriptik", "report", "show", "3f2a"]).unwrap();
    match cli.command {
        Commands::Report(args) => match args.command {
            ReportCommands::Show { id } => assert_eq!(id, "3f2a"),
            ReportCommands::List { .. } => panic!("Wrong report command"),
        },
        _ => panic!("Wrong top-level command"),
    }

    let cli = Cli::try_parse_from(["kriptik", "report", "list", "-p", "acme", "--json"]).unwrap();
    assert!(cli.json);
    match cli.command {
        Commands::Report(args) => match args.command {
            ReportCommands::List { project, limit } => {
                assert_eq!(project.as_deref(), Some("acme"));
                assert_eq!(limit, 20);
            }
            ReportCommands::Show { .. } => panic!("Wrong report command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_config_validate() {
    let cli = Cli::try_parse_from(["kriptik", "config", "validate", "--file", "ci.yaml"]).unwrap();
    match cli.command {
        Commands::Config(args) => match args.command {
            ConfigCommands::Validate { file } => {
                assert_eq!(file, Some(std::path::PathBuf::from("ci.yaml")));
            }
            ConfigCommands::Show => panic!("Wrong config command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_run_requires_prompt() {
    assert!(Cli::try_parse_from(["kriptik", "run"]).is_err());
    assert!(Cli::try_parse_from(["kriptik", "run", "x", "--max-agents", "many"]).is_err());
}

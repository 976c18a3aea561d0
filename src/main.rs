use clap::{Parser, Subcommand};
use headless_core::script::ScriptKind;
use headless_core::{EngineConfig, Session, SessionWaitOutcome};

#[derive(Parser)]
#[clap(author, version, about, long_about = "Drives a page through its lifecycle for manual smoke testing. Not part of the crate's public API.")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// User agent sent with outgoing requests and matched against robots.txt.
    #[clap(long, global = true)]
    user_agent: Option<String>,

    /// Overall timeout in milliseconds before giving up on `wait`.
    #[clap(long, global = true, default_value_t = 30_000)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a URL and run its page lifecycle to completion.
    Run {
        /// URL to load.
        url: String,
    },
    /// Load a URL, queue a classic script as its sole inline script, and run
    /// the page to completion.
    Eval {
        /// URL to load before evaluating.
        url: String,
        /// JS source to evaluate.
        script: String,
    },
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn run_to_completion(session: &mut Session, deadline_ms: u64) -> headless_core::Result<()> {
    let tick_ms = 50;
    let mut waited_ms = 0u64;
    loop {
        match session.wait(tick_ms)? {
            SessionWaitOutcome::Done | SessionWaitOutcome::NoPage => return Ok(()),
            SessionWaitOutcome::Pending => {
                waited_ms += tick_ms;
                if waited_ms >= deadline_ms {
                    return Err(headless_core::Error::Timeout(deadline_ms));
                }
            }
        }
    }
}

fn run_command(command: Commands, config: EngineConfig) -> headless_core::Result<()> {
    match command {
        Commands::Run { url } => {
            let mut session = Session::new(config.clone());
            session.create_page(&url)?;
            run_to_completion(&mut session, config.timeout_ms)?;
            if let Some(page) = session.page() {
                println!("loaded {}", page.url());
            }
        }
        Commands::Eval { url, script } => {
            let mut session = Session::new(config.clone());
            session.create_page(&url)?;
            {
                let page = session.page_mut().expect("just created");
                let element = page.dom_mut().create_element("script");
                page.queue_inline_script(element, ScriptKind::Classic, script, None, None);
                page.mark_static_scripts_done();
            }
            run_to_completion(&mut session, config.timeout_ms)?;
            println!("eval against {url} complete");
        }
    }
    Ok(())
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let mut config = EngineConfig::default();
    if let Some(ua) = cli.user_agent {
        config.user_agent = ua;
    }
    config.timeout_ms = cli.timeout_ms;

    if let Err(e) = run_command(cli.command, config) {
        eprintln!("command failed: {e}");
        std::process::exit(1);
    }
}

use clap::{Parser, ValueEnum};
use std::{
    error::Error,
    io::{self, Write},
};

use xproto::{
    Command, ConnectionParams, FindStatement, Session,
    cli::{format_header, format_outcome, format_row, prompt},
    config::DEFAULT_PORT,
    expr::{self, Mode},
    protocol::{AuthMechanismKind, ClientMessage, ResultEvent},
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Doc,
    Table,
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,
    /// X Protocol port
    #[arg(short = 'P', long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(short, long, default_value = "root")]
    user: String,
    #[arg(short, long, default_value = "")]
    password: String,
    /// Default schema
    #[arg(short, long)]
    schema: Option<String>,
    /// Authentication mechanism (MYSQL41, PLAIN, SHA256_MEMORY)
    #[arg(long)]
    auth: Option<AuthMechanismKind>,
    /// Expression grammar used by `.parse` and `.find`
    #[arg(long, value_enum, default_value_t = ModeArg::Table)]
    mode: ModeArg,
}

async fn run(session: &Session, request: ClientMessage, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let mut execution = session.execute(request).await?;
    let mut rows = 0;

    while let Some(event) = execution.next_event().await {
        match event {
            ResultEvent::Metadata(columns) => writeln!(out, "{}", format_header(&columns))?,
            ResultEvent::Row(row) => {
                rows += 1;
                writeln!(out, "{}", format_row(&row))?;
            }
            ResultEvent::ResultSetEnd { has_more: true } => writeln!(out)?,
            ResultEvent::ResultSetEnd { has_more: false } => {}
        }
    }
    let outcome = execution.finish().await?;
    writeln!(out, "{}", format_outcome(rows, &outcome))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut params = ConnectionParams::new(cli.host, cli.port)
        .user(cli.user)
        .password(cli.password);
    if let Some(schema) = cli.schema {
        params = params.schema(schema);
    }
    if let Some(auth) = cli.auth {
        params = params.auth(auth);
    }
    let mut mode = match cli.mode {
        ModeArg::Doc => Mode::Document,
        ModeArg::Table => Mode::Table,
    };

    let session = Session::connect(&params, None).await?;
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    loop {
        let command = match prompt(&mut stdin, &mut stdout, mode) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        let result = match command {
            Command::Exit => break,
            Command::Mode(m) => {
                mode = m;
                Ok(())
            }
            Command::Parse(text) => match expr::parse_expr(&text, mode) {
                Ok(e) => writeln!(stdout, "{e}").map_err(Into::into),
                Err(e) => Err(e.into()),
            },
            Command::Find { target, filter } => {
                let find = FindStatement::new(params.schema.as_deref(), target, mode);
                let find = match filter {
                    Some(f) => find.filter(&f),
                    None => Ok(find),
                };
                match find.and_then(FindStatement::build) {
                    Ok(request) => run(&session, request, &mut stdout).await,
                    Err(e) => Err(e.into()),
                }
            }
            Command::Reset => session.reset().await.map_err(Into::into),
            Command::Sql(sql) => run(&session, ClientMessage::sql(sql, vec![]), &mut stdout).await,
        };

        if let Err(e) = result {
            eprintln!("error: {e}");
        }
        if !session.is_open() {
            eprintln!("connection lost");
            return Ok(());
        }
    }

    session.close().await?;
    Ok(())
}

use std::io;
use std::process;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use log::LevelFilter;
use master::link::PORT;
use master::{Client, Config, Link, SerialLink, Session, TcpLink, Transport};

fn open_link(config: &Config) -> anyhow::Result<Box<dyn Link>> {
    if let Some(path) = &config.serial {
        let link = SerialLink::open(path).with_context(|| format!("open {}", path))?;
        println!("master: opened {}", path);
        return Ok(Box::new(link));
    }
    let link = TcpLink::connect(&config.addr, PORT)
        .with_context(|| format!("connect {}:{}", config.addr, PORT))?;
    println!("master: connected to {}", link.peer());
    Ok(Box::new(link))
}

fn main() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = match Config::try_parse() {
        Ok(config) => config,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    let link = match open_link(&config) {
        Ok(link) => link,
        Err(err) => {
            eprintln!("master: failed to connect: {:#}", err);
            process::exit(2);
        }
    };

    let transport = Transport::new(link)
        .with_timeout(config.timeout())
        .with_attempts(config.attempts);
    let mut session = Session::new(Client::new(transport), config.price_cents);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let result = session
        .start(&mut stdout)
        .and_then(|()| session.run(stdin.lock(), &mut stdout));
    if let Err(err) = result {
        // communication with the strip is gone, nothing left to do
        println!("{}", err);
    }
    process::exit(0);
}

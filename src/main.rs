mod args;
mod attack;
mod config;
mod entry;
mod error;
mod gun;
mod logger;
mod report;

use error::AppResult;

fn main() -> AppResult<()> {
    entry::run()
}

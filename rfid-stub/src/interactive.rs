//! Terminal front end for the participant menu
//!
//! Operator lines are read on a plain thread because a blocking stdin read
//! cannot be cancelled; the thread is left behind at exit. Logs go to stderr,
//! so stdout belongs to the menu.

use std::io::{self, BufRead, IsTerminal, Write};

use rfid_sim::Selector;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const HELP: &str = "enter: send   k/up j/down: move   r: clear marks   q: quit";

/// Forward stdin lines over a channel; the channel closes at end of input
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);

    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        });

    // Without a reader the sender is dropped and the menu quits immediately
    if let Err(e) = spawned {
        warn!("Failed to start stdin reader: {}", e);
    }
    rx
}

/// Redraw the menu on stdout
pub fn render(selector: &Selector) {
    let stdout = io::stdout();
    let clear = stdout.is_terminal();
    if let Err(e) = write_menu(&mut stdout.lock(), selector, clear) {
        debug!("Failed to draw menu: {}", e);
    }
}

fn write_menu<W: Write>(out: &mut W, selector: &Selector, clear: bool) -> io::Result<()> {
    if clear {
        write!(out, "\x1b[2J\x1b[H")?;
    }
    write!(out, "{selector}")?;
    writeln!(out)?;
    writeln!(out, "{HELP}")?;
    out.flush()
}

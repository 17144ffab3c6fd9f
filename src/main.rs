use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use hatch::cli::Cli;
use hatch::editor::OpenOutcome;
use hatch::jobs::{ExportRunner, JobResult};
use hatch::terminal::{handle_key, ResizeWatcher, Size};
use hatch::{last_command, load_config, logging, Editor, LockKeeper, Paths, Portal, Terminal};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load_config();
    let paths = settings.paths();

    if cli.last_command {
        return Ok(print_last_command(&paths.last_command_file));
    }
    if cli.clear_locks {
        return Ok(clear_locks(&paths));
    }

    if let Err(e) = logging::init(&paths.log_file) {
        eprintln!("hatch: logging disabled: {:#}", e);
    }

    let mut editor = Editor::new(settings, paths);
    // Jumps below place the cursor against the real window height
    if let Ok(size) = Terminal::size() {
        editor.resize(size.text_rows());
    }

    if let Some(target) = cli.target() {
        match editor.open_file(&target.path, cli.force) {
            Ok(OpenOutcome::Opened) => {}
            Ok(OpenOutcome::Locked { owner }) => {
                eprintln!(
                    "{} is already being edited by process {} (use --force to open it anyway)",
                    target.path.display(),
                    owner
                );
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => {
                eprintln!("hatch: {:#}", e);
                return Ok(ExitCode::FAILURE);
            }
        }
        match (target.line, target.col) {
            (Some(line), Some(col)) => {
                editor.goto_line_and_column(line, col, true);
            }
            (Some(line), None) => {
                editor.goto_line_number(line, true);
            }
            _ => {}
        }
    }

    let result = run(&mut editor);
    editor.close();
    result?;
    Ok(ExitCode::SUCCESS)
}

fn run(editor: &mut Editor) -> anyhow::Result<()> {
    let mut terminal = Terminal::new()?;
    let watcher = ResizeWatcher::spawn(Terminal::size()?, Duration::from_millis(250));
    editor.resize(watcher.read().text_rows());

    let exports = ExportRunner::new();
    let poll_timeout = Duration::from_millis(16);

    // Main event loop
    loop {
        if watcher.take_resized() {
            let rows = watcher.read().text_rows();
            editor.resize(rows);
        }

        while let Some(result) = exports.try_recv() {
            match result {
                JobResult::Finished { .. } => editor.set_status(result.message()),
                JobResult::Failed { .. } => editor.set_error(result.message()),
            }
        }

        {
            let size = watcher.read();
            terminal.render(editor, &size)?;
        }

        if editor.should_quit {
            break;
        }

        if let Some(command) = editor.pending_external_command.take() {
            if let Err(e) = terminal.run_external_process(&command) {
                editor.set_error(e.to_string());
            }
            editor.invalidate();
        }

        if let Some(command) = editor.pending_export.take() {
            if exports.is_busy() {
                editor.set_status(format!("Queued after the running export: {}", command));
            }
            let cwd = editor.path().and_then(Path::parent).map(Path::to_path_buf);
            exports.spawn(command, cwd);
        }

        if event::poll(poll_timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(editor, key),
                Event::Resize(width, height) => watcher.update(Size::new(width, height)),
                _ => {}
            }
        }
    }

    Ok(())
}

fn print_last_command(file: &Path) -> ExitCode {
    match last_command::read(file) {
        Ok(Some(command)) => {
            println!("{}", command);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("no available last command");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("hatch: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Remove the lock registry and close the portal
fn clear_locks(paths: &Paths) -> ExitCode {
    if let Err(e) = LockKeeper::clear_all(&paths.lock_file) {
        eprintln!("hatch: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = Portal::new(&paths.portal_file).clear() {
        eprintln!("hatch: {}", e);
        return ExitCode::FAILURE;
    }
    println!("Cleared all locks and closed the portal");
    ExitCode::SUCCESS
}

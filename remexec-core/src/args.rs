//! Command-line assembly for each backend family

use crate::backend::{ArgStyle, BackendKind};
use crate::credentials::Credentials;
use crate::options::{CopySource, ExecOptions, Overwrite};

/// Build the argument vector passed to the backend executable
pub fn build_args(
    kind: BackendKind,
    host: &str,
    credentials: &Credentials,
    options: &ExecOptions,
    command: &str,
) -> Vec<String> {
    match kind.arg_style() {
        ArgStyle::WinExe => winexe_args(host, credentials, options, command),
        ArgStyle::PsExec => psexec_args(kind, host, credentials, options, command),
        ArgStyle::Impacket => impacket_args(host, credentials, command),
    }
}

/// `winexe [--user=U[%P]] [--no-pass] [--reinstall] [--uninstall] [--system] //HOST CMD`
fn winexe_args(
    host: &str,
    credentials: &Credentials,
    options: &ExecOptions,
    command: &str,
) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(username) = &credentials.username {
        let user = username.render(ArgStyle::WinExe);
        match credentials.password() {
            Some(password) => args.push(format!("--user={}%{}", user, password)),
            None => args.push(format!("--user={}", user)),
        }
    }

    if !credentials.has_password() {
        args.push("--no-pass".to_string());
    }

    if options.reinstall {
        args.push("--reinstall".to_string());
    }
    if options.uninstall {
        args.push("--uninstall".to_string());
    }
    if options.system {
        args.push("--system".to_string());
    }

    args.push(format!("//{}", host));
    args.push(command.to_string());
    args
}

/// `psexec \\HOST [-u U] [-p P] [-s] [-h] [-c [-f|-v] [-csrc F|-clist L]] [-accepteula -nobanner] CMD...`
fn psexec_args(
    kind: BackendKind,
    host: &str,
    credentials: &Credentials,
    options: &ExecOptions,
    command: &str,
) -> Vec<String> {
    let mut args = vec![format!(r"\\{}", host)];

    if let Some(username) = &credentials.username {
        args.push("-u".to_string());
        args.push(username.render(ArgStyle::PsExec));
    }
    if let Some(password) = credentials.password() {
        args.push("-p".to_string());
        args.push(password.to_string());
    }

    if options.system {
        args.push("-s".to_string());
    }
    if options.elevated {
        args.push("-h".to_string());
    }

    if let Some(copy) = &options.copy {
        args.push("-c".to_string());

        match copy.overwrite {
            Some(Overwrite::Force) => args.push("-f".to_string()),
            Some(Overwrite::Version) => args.push("-v".to_string()),
            None => {}
        }

        match &copy.source {
            Some(CopySource::File(file)) => {
                args.push("-csrc".to_string());
                args.push(file.display().to_string());
            }
            Some(CopySource::List(list)) => {
                args.push("-clist".to_string());
                args.push(list.display().to_string());
            }
            None => {}
        }
    }

    // paexec accepts neither flag
    if kind == BackendKind::PsExec {
        args.push("-accepteula".to_string());
        args.push("-nobanner".to_string());
    }

    args.extend(split_command(command));
    args
}

/// `psexec.py [-no-pass] [USER[:PASS]@]HOST CMD`
fn impacket_args(host: &str, credentials: &Credentials, command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut target = String::new();

    if let Some(username) = &credentials.username {
        target.push_str(&username.render(ArgStyle::Impacket));
        match credentials.password() {
            Some(password) => {
                target.push(':');
                target.push_str(password);
            }
            None => args.push("-no-pass".to_string()),
        }
        target.push('@');
    }

    target.push_str(host);
    args.push(target);
    args.push(command.to_string());
    args
}

/// Split a command line on spaces that sit outside double quotes.
///
/// Quote characters stay in the tokens. Every unquoted space is a
/// separator, so consecutive spaces produce empty tokens.
pub fn split_command(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for c in command.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                current.push(c);
            }
            ' ' if !in_quote => tokens.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    tokens.push(current);
    tokens
}

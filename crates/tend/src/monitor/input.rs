//! Key handling. Pure: mutates view state and returns what the driver should do.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::MonitorExit;
use super::state::{App, Confirm, Mode, StatusFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Refresh,
    Kill(String),
    Detach(String),
    Exit(MonitorExit),
}

pub fn handle_key(app: &mut App, key: KeyEvent) -> Action {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Action::Exit(MonitorExit::Quit);
    }

    match app.mode.clone() {
        Mode::Browse => browse(app, key),
        Mode::Search => {
            search(app, key);
            Action::None
        }
        Mode::Filter { cursor } => {
            filter(app, key, cursor);
            Action::None
        }
        Mode::Confirm(confirm) => self::confirm(app, key, confirm),
        Mode::Help => {
            if matches!(
                key.code,
                KeyCode::Char('?') | KeyCode::F(1) | KeyCode::Esc | KeyCode::Char('q')
            ) {
                app.mode = Mode::Browse;
            }
            Action::None
        }
    }
}

fn browse(app: &mut App, key: KeyEvent) -> Action {
    app.notice = None;
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Action::Exit(MonitorExit::Quit),
        KeyCode::Char('j') | KeyCode::Down => app.move_cursor(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_cursor(-1),
        KeyCode::Char('g') | KeyCode::Home => app.top(),
        KeyCode::Char('G') | KeyCode::End => app.bottom(),
        KeyCode::Char('/') => app.mode = Mode::Search,
        KeyCode::Char('f') => app.mode = Mode::Filter { cursor: 0 },
        KeyCode::Char('s') => app.cycle_sort(),
        KeyCode::Left => app.view.sort.move_cursor(-1),
        KeyCode::Right => app.view.sort.move_cursor(1),
        KeyCode::Char('?') | KeyCode::F(1) => app.mode = Mode::Help,
        KeyCode::Char('r') => return Action::Refresh,
        KeyCode::Char('n') => return Action::Exit(MonitorExit::Create),
        KeyCode::Enter => return attach(app),
        KeyCode::Char('x') => {
            if let Some(id) = app.selected().map(|r| r.id.clone()) {
                app.mode = Mode::Confirm(Confirm::Kill { id });
            }
        }
        KeyCode::Char('d') => match app.selected() {
            Some(r) if r.attached > 0 => {
                app.mode = Mode::Confirm(Confirm::Detach {
                    id: r.id.clone(),
                    clients: r.attached,
                });
            }
            Some(r) => app.notice = Some(format!("{} has no attached clients", r.id)),
            None => {}
        },
        _ => {}
    }
    Action::None
}

fn attach(app: &mut App) -> Action {
    let Some(record) = app.selected() else {
        return Action::None;
    };
    if record.is_exited() {
        app.notice = Some(format!("{} has exited", record.id));
        return Action::None;
    }
    if record.attached > 0 {
        app.mode = Mode::Confirm(Confirm::AttachAttached {
            id: record.id.clone(),
            clients: record.attached,
        });
        return Action::None;
    }
    Action::Exit(MonitorExit::Attach {
        id: record.id.clone(),
        force: false,
    })
}

fn search(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.set_search(String::new());
            app.mode = Mode::Browse;
        }
        KeyCode::Enter => app.mode = Mode::Browse,
        KeyCode::Backspace => {
            let mut search = app.view.search.clone();
            search.pop();
            app.set_search(search);
        }
        KeyCode::Down => app.move_cursor(1),
        KeyCode::Up => app.move_cursor(-1),
        KeyCode::Char(c) => {
            let mut search = app.view.search.clone();
            search.push(c);
            app.set_search(search);
        }
        _ => {}
    }
}

fn filter(app: &mut App, key: KeyEvent, cursor: usize) {
    let last = StatusFilter::ENTRIES - 1;
    match key.code {
        KeyCode::Esc | KeyCode::Char('f') | KeyCode::Char('q') => app.mode = Mode::Browse,
        KeyCode::Char('j') | KeyCode::Down => {
            app.mode = Mode::Filter {
                cursor: (cursor + 1).min(last),
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.mode = Mode::Filter {
                cursor: cursor.saturating_sub(1),
            }
        }
        KeyCode::Char(' ') | KeyCode::Enter => app.toggle_filter(cursor),
        _ => {}
    }
}

fn confirm(app: &mut App, key: KeyEvent, confirm: Confirm) -> Action {
    let yes = matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter);
    let no = matches!(key.code, KeyCode::Char('n') | KeyCode::Esc | KeyCode::Char('q'));

    let action = match confirm {
        Confirm::Kill { id } if yes => Action::Kill(id),
        Confirm::Detach { id, .. } if yes => Action::Detach(id),
        Confirm::AttachAttached { id, .. } if yes => {
            Action::Exit(MonitorExit::Attach { id, force: true })
        }
        Confirm::AttachAttached { id, .. } if key.code == KeyCode::Char('f') => {
            Action::Exit(MonitorExit::Focus { id })
        }
        _ if no => Action::None,
        // Ignore anything else and keep the dialog open
        _ => return Action::None,
    };
    app.mode = Mode::Browse;
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use tend_core::{SessionRecord, SessionStatus};

    use crate::monitor::state::ViewState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        let mut attached = SessionRecord::new("busy", "/srv");
        attached.attached = 2;
        let mut gone = SessionRecord::new("gone", "/tmp");
        gone.status = SessionStatus::Exited;
        let mut app = App::new(ViewState::default());
        app.set_records(vec![SessionRecord::new("free", "/home"), attached, gone]);
        app
    }

    #[test]
    fn test_enter_attaches_free_session() {
        let mut app = app();
        assert_eq!(
            handle_key(&mut app, key(KeyCode::Enter)),
            Action::Exit(MonitorExit::Attach {
                id: "free".to_string(),
                force: false
            })
        );
    }

    #[test]
    fn test_enter_on_attached_session_offers_focus() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('j')));
        assert_eq!(handle_key(&mut app, key(KeyCode::Enter)), Action::None);
        assert!(matches!(app.mode, Mode::Confirm(Confirm::AttachAttached { clients: 2, .. })));

        assert_eq!(
            handle_key(&mut app, key(KeyCode::Char('f'))),
            Action::Exit(MonitorExit::Focus {
                id: "busy".to_string()
            })
        );
        assert_eq!(app.mode, Mode::Browse);

        handle_key(&mut app, key(KeyCode::Enter));
        assert_eq!(
            handle_key(&mut app, key(KeyCode::Char('y'))),
            Action::Exit(MonitorExit::Attach {
                id: "busy".to_string(),
                force: true
            })
        );
    }

    #[test]
    fn test_enter_on_exited_session_is_refused() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('G')));
        assert_eq!(handle_key(&mut app, key(KeyCode::Enter)), Action::None);
        assert_eq!(app.mode, Mode::Browse);
        assert!(app.notice.as_deref().unwrap().contains("exited"));
    }

    #[test]
    fn test_kill_requires_confirmation() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('x')));
        assert!(matches!(app.mode, Mode::Confirm(Confirm::Kill { .. })));
        handle_key(&mut app, key(KeyCode::Char('z')));
        assert!(matches!(app.mode, Mode::Confirm(Confirm::Kill { .. })));
        assert_eq!(handle_key(&mut app, key(KeyCode::Esc)), Action::None);
        assert_eq!(app.mode, Mode::Browse);

        handle_key(&mut app, key(KeyCode::Char('x')));
        assert_eq!(
            handle_key(&mut app, key(KeyCode::Char('y'))),
            Action::Kill("free".to_string())
        );
    }

    #[test]
    fn test_detach_only_offered_with_clients() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('d')));
        assert_eq!(app.mode, Mode::Browse);
        assert!(app.notice.is_some());

        handle_key(&mut app, key(KeyCode::Down));
        handle_key(&mut app, key(KeyCode::Char('d')));
        assert_eq!(
            handle_key(&mut app, key(KeyCode::Char('y'))),
            Action::Detach("busy".to_string())
        );
    }

    #[test]
    fn test_search_is_incremental() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('/')));
        handle_key(&mut app, key(KeyCode::Char('s')));
        handle_key(&mut app, key(KeyCode::Char('r')));
        assert_eq!(app.row_count(), 1);
        // Keys that act in Browse are text while searching
        assert_eq!(app.mode, Mode::Search);

        handle_key(&mut app, key(KeyCode::Backspace));
        handle_key(&mut app, key(KeyCode::Backspace));
        assert_eq!(app.row_count(), 3);

        handle_key(&mut app, key(KeyCode::Char('g')));
        handle_key(&mut app, key(KeyCode::Enter));
        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.view.search, "g");

        handle_key(&mut app, key(KeyCode::Char('/')));
        handle_key(&mut app, key(KeyCode::Esc));
        assert!(app.view.search.is_empty());
    }

    #[test]
    fn test_filter_popup_toggles_entries() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('f')));
        for _ in 0..6 {
            handle_key(&mut app, key(KeyCode::Char('j')));
        }
        assert_eq!(app.mode, Mode::Filter { cursor: 6 });
        handle_key(&mut app, key(KeyCode::Char(' ')));
        assert_eq!(app.row_count(), 1);

        handle_key(&mut app, key(KeyCode::Char('k')));
        handle_key(&mut app, key(KeyCode::Char('k')));
        handle_key(&mut app, key(KeyCode::Char('k')));
        handle_key(&mut app, key(KeyCode::Char('k')));
        handle_key(&mut app, key(KeyCode::Char('k')));
        handle_key(&mut app, key(KeyCode::Char('k')));
        handle_key(&mut app, key(KeyCode::Enter));
        assert!(app.view.filter.is_all());
        assert_eq!(app.row_count(), 3);

        handle_key(&mut app, key(KeyCode::Esc));
        assert_eq!(app.mode, Mode::Browse);
    }

    #[test]
    fn test_quit_and_help() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('?')));
        assert_eq!(app.mode, Mode::Help);
        assert_eq!(handle_key(&mut app, key(KeyCode::Char('q'))), Action::None);
        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(
            handle_key(&mut app, key(KeyCode::Char('q'))),
            Action::Exit(MonitorExit::Quit)
        );
        assert_eq!(
            handle_key(
                &mut app,
                KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
            ),
            Action::Exit(MonitorExit::Quit)
        );
        assert_eq!(
            handle_key(&mut app, key(KeyCode::Char('n'))),
            Action::Exit(MonitorExit::Create)
        );
    }
}

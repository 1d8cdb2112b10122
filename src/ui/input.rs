//! Keyboard input handling.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{
    App, AppState, AuthFocus, FormFocus, View, MAX_EMAIL_LENGTH, MAX_FIELD_LENGTH,
    MAX_PASSWORD_LENGTH, MAX_PATH_LENGTH,
};

/// Handle a key event. Returns `Ok(true)` when the app should exit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.state {
        AppState::Quitting => Ok(true),

        AppState::ShowingHelp => {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q')) {
                app.state = AppState::Normal;
            }
            Ok(false)
        }

        AppState::ConfirmingQuit => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => return Ok(true),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.state = AppState::Normal;
                }
                _ => {}
            }
            Ok(false)
        }

        AppState::ConfirmingDelete => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => app.confirm_delete(),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.state = AppState::Normal;
                }
                _ => {}
            }
            Ok(false)
        }

        AppState::LoggingIn | AppState::SigningUp => {
            handle_auth_input(app, key);
            Ok(false)
        }

        AppState::Searching => {
            handle_search_input(app, key);
            Ok(false)
        }

        AppState::Normal => match app.view {
            View::Products => handle_products_input(app, key),
            View::ProductForm => {
                handle_form_input(app, key);
                Ok(false)
            }
        },
    }
}

fn handle_products_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    // Any keypress dismisses a stale status message
    app.status_message = None;

    match key.code {
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,

        KeyCode::Char('/') => {
            app.search_query.clear();
            app.selection = 0;
            app.state = AppState::Searching;
        }

        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Left | KeyCode::Char('[') => app.prev_page(),
        KeyCode::Right | KeyCode::Char(']') => app.next_page(),

        KeyCode::Char('r') => app.load_products(),

        // Account
        KeyCode::Char('l') if !app.user_is_authenticated => app.start_login(),
        KeyCode::Char('s') if !app.user_is_authenticated => app.start_signup(),
        KeyCode::Char('o') if app.user_is_authenticated => app.logout(),

        // Product management
        KeyCode::Char('n') => app.open_create_form(),
        KeyCode::Char('e') | KeyCode::Enter => app.open_edit_form(),
        KeyCode::Char('x') | KeyCode::Delete => app.request_delete(),

        _ => {}
    }
    Ok(false)
}

fn handle_auth_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.state = AppState::Normal;
            app.auth_error = None;
        }
        KeyCode::Tab | KeyCode::Down => app.auth_focus = app.auth_focus.next(),
        KeyCode::BackTab | KeyCode::Up => {
            // Cycle backwards through the three-entry focus ring
            app.auth_focus = app.auth_focus.next().next();
        }
        KeyCode::Enter => app.submit_auth(),
        KeyCode::Backspace => match app.auth_focus {
            AuthFocus::Email => {
                app.auth_email.pop();
            }
            AuthFocus::Password => {
                app.auth_password.pop();
            }
            AuthFocus::Button => {}
        },
        KeyCode::Char(c) => match app.auth_focus {
            AuthFocus::Email => {
                if app.auth_email.len() < MAX_EMAIL_LENGTH {
                    app.auth_email.push(c);
                }
            }
            AuthFocus::Password => {
                if app.auth_password.len() < MAX_PASSWORD_LENGTH {
                    app.auth_password.push(c);
                }
            }
            AuthFocus::Button => {}
        },
        _ => {}
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.search_query.clear();
            app.selection = 0;
            app.state = AppState::Normal;
        }
        KeyCode::Enter => app.state = AppState::Normal,
        KeyCode::Backspace => {
            app.search_query.pop();
            app.selection = 0;
        }
        KeyCode::Char(c) => {
            app.search_query.push(c);
            app.selection = 0;
        }
        _ => {}
    }
}

fn handle_form_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_form(),
        KeyCode::Tab | KeyCode::Down => app.form_focus = app.form_focus.next(),
        KeyCode::BackTab | KeyCode::Up => app.form_focus = app.form_focus.prev(),
        KeyCode::Enter => {
            if app.form_focus == FormFocus::Button {
                app.submit_form();
            } else {
                app.form_focus = app.form_focus.next();
            }
        }
        KeyCode::Backspace => {
            if let Some(field) = focused_field(app) {
                field.pop();
            }
        }
        KeyCode::Char(c) => {
            let cap = match app.form_focus {
                FormFocus::Image => MAX_PATH_LENGTH,
                _ => MAX_FIELD_LENGTH,
            };
            if let Some(field) = focused_field(app) {
                if field.len() < cap {
                    field.push(c);
                }
            }
        }
        _ => {}
    }
}

fn focused_field(app: &mut App) -> Option<&mut String> {
    match app.form_focus {
        FormFocus::Name => Some(&mut app.form.name),
        FormFocus::Inventory => Some(&mut app.form.inventory),
        FormFocus::Price => Some(&mut app.form.price),
        FormFocus::Image => Some(&mut app.form.image_path),
        FormFocus::Button => None,
    }
}

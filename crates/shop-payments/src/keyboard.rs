use shop_config::Texts;
use shop_schemas::{InlineButton, Keyboard};

/// Keyboard attached to activation and referral messages: a connect button
/// (web app when a mini-app URL is configured) and a back button.
pub fn connect_keyboard(texts: &Texts, mini_app_url: Option<&str>) -> Keyboard {
    let connect = match mini_app_url.filter(|u| !u.is_empty()) {
        Some(url) => InlineButton::web_app(&texts.connect_button, url),
        None => InlineButton::callback(&texts.connect_button, "connect"),
    };
    Keyboard {
        rows: vec![
            vec![connect],
            vec![InlineButton::callback(&texts.back_button, "start")],
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_connect_without_mini_app() {
        let k = connect_keyboard(&Texts::default(), None);
        assert_eq!(k.rows.len(), 2);
        assert_eq!(k.rows[0][0].callback_data.as_deref(), Some("connect"));
        assert_eq!(k.rows[1][0].callback_data.as_deref(), Some("start"));
    }

    #[test]
    fn web_app_connect_with_mini_app() {
        let k = connect_keyboard(&Texts::default(), Some("https://app.example"));
        assert_eq!(k.rows[0][0].web_app_url.as_deref(), Some("https://app.example"));
        assert_eq!(k.rows[0][0].callback_data, None);

        let blank = connect_keyboard(&Texts::default(), Some(""));
        assert_eq!(blank.rows[0][0].callback_data.as_deref(), Some("connect"));
    }
}

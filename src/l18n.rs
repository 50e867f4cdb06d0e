use std::{collections::HashMap, fmt::Display, sync::OnceLock};

static CATALOG: OnceLock<Catalog> = OnceLock::new();
static CATALOGS: [(&str, &str); 2] = [
    ("de", include_str!("../locales/de.ron")),
    ("fr", include_str!("../locales/fr.ron")),
];

/// Message translations for a single language, keyed by the English text.
#[derive(Debug, Default)]
pub struct Catalog(HashMap<String, String>);

impl Catalog {
    /// Accepts plain language codes as well as locale tags like `de-DE` or `fr_CA`.
    pub fn for_language(tag: &str) -> Self {
        let language = tag
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_lowercase();

        let Some((_, data)) = CATALOGS.iter().find(|(code, _)| *code == language) else {
            return Self::default();
        };

        match ron::from_str::<HashMap<String, String>>(data) {
            Ok(messages) => Self(messages),
            Err(err) => {
                log::warn!("Unable to parse {language} catalog, falling back to english: {err}");
                Self::default()
            }
        }
    }

    pub fn translate<'a>(&'a self, msg: &'a str) -> &'a str {
        self.0.get(msg).map(String::as_str).unwrap_or(msg)
    }

    pub fn format(&self, fmt: &str, args: &[&dyn Display]) -> String {
        interpolate(self.translate(fmt), args)
    }
}

fn interpolate(template: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;

    while let Some(idx) = rest.find("{}") {
        out.push_str(&rest[..idx]);
        match args.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str("{}"),
        }
        rest = &rest[idx + 2..];
    }

    out.push_str(rest);
    out
}

fn catalog() -> &'static Catalog {
    CATALOG.get_or_init(|| {
        let tag = std::env::var("WIREGUARD_RS_LANG")
            .ok()
            .or_else(sys_locale::get_locale)
            .unwrap_or_else(|| "en".into());
        log::trace!("Using message catalog for {tag}");
        Catalog::for_language(&tag)
    })
}

pub fn tr(msg: &str) -> String {
    catalog().translate(msg).to_owned()
}

/// Translates `fmt`, then substitutes each `{}` with the next argument.
/// Arguments are inserted as-is and never translated.
pub fn sprintf(fmt: &str, args: &[&dyn Display]) -> String {
    catalog().format(fmt, args)
}

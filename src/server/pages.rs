//! HTML page templates embedded into the binary

use anyhow::Context;
use minijinja::Environment;
use rust_embed::RustEmbed;
use serde::Serialize;

#[derive(RustEmbed)]
#[folder = "templates/"]
struct Templates;

pub const INDEX: &str = "index.html";
pub const RESULT: &str = "result.html";
pub const ERROR: &str = "error.html";

/// Compiled templates; HTML-escapes every interpolated value
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn load() -> anyhow::Result<Self> {
        let mut env = Environment::new();
        for name in Templates::iter() {
            let Some(file) = Templates::get(&name) else {
                continue;
            };
            let source = String::from_utf8(file.data.into_owned())
                .with_context(|| format!("template {name} is not UTF-8"))?;
            env.add_template_owned(name.into_owned(), source)?;
        }
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }
}

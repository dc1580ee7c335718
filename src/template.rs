use anyhow::{Context, Result, bail};

/// Render a prompt template, substituting `{KEY}` placeholders.
///
/// `{{` and `}}` produce literal braces. A placeholder with no matching
/// argument is an error rather than being left in the prompt.
pub fn render<K, V>(template: &str, args: &[(K, V)]) -> Result<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        rendered.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            rendered.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            rendered.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            bail!("Single '}}' encountered in prompt template");
        } else {
            let end = tail
                .find('}')
                .context("Unclosed placeholder in prompt template")?;
            let key = &tail[1..end];
            if key.is_empty() || key.contains('{') {
                bail!("Invalid placeholder {{{}}} in prompt template", key);
            }
            let value = args
                .iter()
                .find(|(name, _)| name.as_ref() == key)
                .map(|(_, value)| value.as_ref())
                .with_context(|| format!("No value for placeholder {{{}}} in prompt template", key))?;
            rendered.push_str(value);
            rest = &tail[end + 1..];
        }
    }

    rendered.push_str(rest);
    Ok(rendered)
}

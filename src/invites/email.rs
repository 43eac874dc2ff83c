// Invitation email rendering

/// A rendered message ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub accept_url: String,
}

/// Accept link handled by the accept-invite endpoint
pub fn accept_url(public_url: &str, invite_id: &str) -> String {
    format!("{}/acceptInvite?id={}", public_url.trim_end_matches('/'), invite_id)
}

pub fn render_invitation(
    to: &str,
    accept_url: &str,
    inviter_name: &str,
    contract_title: &str,
) -> InvitationEmail {
    let inviter = escape_html(inviter_name);
    let title = escape_html(contract_title);
    let link = escape_html(accept_url);

    let html = format!(
        r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; color: #1f2937;">
    <h2>You have been invited to a contract</h2>
    <p>{inviter} has shared the contract <strong>{title}</strong> with you ({recipient}).</p>
    <p>
      <a href="{link}" style="background: #2563eb; color: #ffffff; padding: 10px 18px; border-radius: 4px; text-decoration: none;">
        Accept invitation
      </a>
    </p>
    <p style="font-size: 12px; color: #6b7280;">If the button does not work, open this link: {link}</p>
  </body>
</html>
"#,
        recipient = escape_html(to),
    );

    InvitationEmail {
        to: to.to_string(),
        subject: format!("{inviter_name} invited you to \"{contract_title}\""),
        html,
        accept_url: accept_url.to_string(),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_url_trims_trailing_slash() {
        assert_eq!(
            accept_url("https://api.example.com/", "abc"),
            "https://api.example.com/acceptInvite?id=abc"
        );
    }

    #[test]
    fn test_rendered_email_contains_required_parts() {
        let email = render_invitation(
            "guest@example.com",
            "https://api.example.com/acceptInvite?id=abc",
            "Dana",
            "Water <Rights> Agreement",
        );
        assert_eq!(email.to, "guest@example.com");
        assert!(email.html.contains("guest@example.com"));
        assert!(email.html.contains("https://api.example.com/acceptInvite?id=abc"));
        assert!(email.html.contains("Dana"));
        assert!(email.html.contains("Water &lt;Rights&gt; Agreement"));
        assert!(email.subject.contains("Water <Rights> Agreement"));
    }
}

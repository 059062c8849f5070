//! Branded welcome email for new and re-confirmed subscribers.

use crate::config::AppConfig;
use crate::mail::{Email, MailError};

/// Human-friendly plan wording for the welcome copy.
pub fn plan_display_name(plan_code: Option<&str>) -> String {
    let Some(raw) = plan_code.filter(|p| !p.trim().is_empty()) else {
        return "our updates".to_string();
    };

    match raw.trim().to_lowercase().as_str() {
        "newsletter" => "our newsletter".to_string(),
        "insights" => "the Insights updates".to_string(),
        "bootcamp" => "the Bootcamp interest list".to_string(),
        _ => format!("the {raw} plan"),
    }
}

/// Compose the multipart welcome message for one subscriber.
pub fn welcome_email(
    config: &AppConfig,
    recipient: &str,
    plan_code: Option<&str>,
) -> Result<Email, MailError> {
    let brand = config.brand_name.trim();
    let subject = if brand.is_empty() {
        "Thanks for subscribing".to_string()
    } else {
        format!("Thanks for subscribing to {brand}")
    };

    let brand = if brand.is_empty() {
        "Ai For Impact"
    } else {
        brand
    };
    let plan = plan_display_name(plan_code);
    let site = super::site_url(config);

    let text = format!(
        "Hi,\n\
         \n\
         Thanks for subscribing to {plan}. You're on the list for practical AI\n\
         sessions, new cohort dates, and the occasional product update from\n\
         {brand}.\n\
         \n\
         Visit us any time: {site}\n\
         \n\
         — The {brand} team\n\
         \n\
         You're receiving this because {recipient} subscribed on {site}.\n"
    );

    let html = format!(
        r#"<!doctype html>
<html>
  <body style="margin:0;padding:24px;background-color:#f4f5f7;font-family:Arial,Helvetica,sans-serif;color:#1f2933;">
    <div style="max-width:520px;margin:0 auto;background-color:#ffffff;border-radius:8px;padding:32px;">
      <img src="{logo}" alt="{brand}" height="40" style="display:block;margin-bottom:24px;">
      <h1 style="font-size:20px;margin:0 0 16px;">Thanks for subscribing!</h1>
      <p style="margin:0 0 16px;line-height:1.6;">You're on the list for {plan}. Expect practical AI sessions, new cohort dates, and the occasional product update.</p>
      <p style="margin:24px 0;">
        <a href="{site}" style="background-color:{accent};color:#ffffff;text-decoration:none;padding:10px 18px;border-radius:6px;">Visit {brand}</a>
      </p>
      <p style="margin:24px 0 0;font-size:12px;color:#6b7280;">You're receiving this because {recipient} subscribed on {site}.</p>
    </div>
  </body>
</html>
"#,
        logo = config.brand_logo_url,
        accent = config.brand_accent,
    );

    Email::builder()
        .to(recipient)
        .subject(subject)
        .text(text)
        .html(html)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::EmailBody;

    fn config() -> AppConfig {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }

    #[test]
    fn plan_wording_covers_the_known_plans() {
        assert_eq!(plan_display_name(None), "our updates");
        assert_eq!(plan_display_name(Some("")), "our updates");
        assert_eq!(plan_display_name(Some("newsletter")), "our newsletter");
        assert_eq!(plan_display_name(Some(" Insights ")), "the Insights updates");
        assert_eq!(
            plan_display_name(Some("BOOTCAMP")),
            "the Bootcamp interest list"
        );
        assert_eq!(plan_display_name(Some("vip")), "the vip plan");
    }

    #[test]
    fn welcome_is_branded_multipart() {
        let email = welcome_email(&config(), "sam@example.com", Some("newsletter")).unwrap();

        assert_eq!(email.to, vec!["sam@example.com"]);
        assert_eq!(email.subject, "Thanks for subscribing to Ai For Impact");

        let EmailBody::Multipart { text, html } = &email.body else {
            panic!("welcome should carry text and html parts");
        };
        assert!(text.contains("our newsletter"));
        assert!(text.contains("https://aiforimpact.net"));
        assert!(html.contains("#5ca9ff"));
        assert!(html.contains("https://i.imgur.com/STm5VaG.png"));
        assert!(html.contains("sam@example.com"));
    }

    #[test]
    fn blank_brand_shortens_the_subject() {
        let config: AppConfig =
            serde_json::from_value(serde_json::json!({"brand_name": "  "})).unwrap();

        let email = welcome_email(&config, "sam@example.com", None).unwrap();
        assert_eq!(email.subject, "Thanks for subscribing");

        let text = email.body.text().unwrap();
        assert!(text.contains("The Ai For Impact team"));
    }

    #[test]
    fn site_link_drops_the_trailing_slash() {
        let config: AppConfig =
            serde_json::from_value(serde_json::json!({"site_url": "https://example.com/"}))
                .unwrap();

        let email = welcome_email(&config, "sam@example.com", None).unwrap();
        let EmailBody::Multipart { html, .. } = &email.body else {
            panic!("welcome should carry text and html parts");
        };
        assert!(html.contains(r#"href="https://example.com""#));
    }
}

//! HTML page generators for the login and access-denied experiences.
//!
//! The login page performs the PocketBase OAuth flow entirely client-side
//! and posts the resulting token to `/api/cookie`. Every interpolated value
//! goes through [`escape_html`] or [`escape_js`]; the redirect URL is
//! additionally validated by the redirect module before it reaches here.

/// Escape HTML special characters.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// Escape a string for use inside a JavaScript string literal. Angle
/// brackets become hex escapes so a value can never close the script tag.
pub fn escape_js(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('<', "\\x3c")
        .replace('>', "\\x3e")
}

/// The login page. `redirect_url` must already be validated; when present it
/// is stashed in a short-lived cookie that the exchange script consumes to
/// send the user back where they came from.
pub fn login_page(
    pocketbase_url: &str,
    pocketbase_url_microsoft: Option<&str>,
    redirect_url: Option<&str>,
) -> String {
    let pb_url = escape_js(pocketbase_url);
    let pb_url_microsoft = escape_js(pocketbase_url_microsoft.unwrap_or(pocketbase_url));
    let redirect_script = match redirect_url.filter(|rd| !rd.is_empty()) {
        Some(rd) => format!(
            "document.cookie = 'auth_redirect={}; Path=/; Max-Age=300; SameSite=Lax';",
            escape_js(rd)
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Sign in</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/infima@0.2.0-alpha.45/dist/css/default/default.min.css" />
  <style>
    .stack-vertically {{
      display: flex;
      flex-direction: column;
      gap: 1rem;
      align-items: flex-start;
    }}
  </style>
</head>
<body>
<div class="container padding-top--lg">
  <h1>Please sign in</h1>
  <p>Sign in with one of the providers below to see the protected content.</p>
  <div class="stack-vertically padding-bottom--md">
    <button type="button" class="button button--primary" id="loginWithGithub">Sign in with GitHub</button>
    <button type="button" class="button button--primary" id="loginWithGoogle">Sign in with Google</button>
    <button type="button" class="button button--primary" id="loginWithMicrosoft">Sign in with Microsoft</button>
  </div>
  <p>No account is needed here: authentication is delegated to the provider
  you pick, and nothing beyond your email address is stored.</p>
</div>
<script src="https://cdn.jsdelivr.net/npm/pocketbase@0.26.0/dist/pocketbase.umd.min.js"></script>
<script>
  const pb = new PocketBase("{pb_url}");
  const pbMicrosoft = new PocketBase("{pb_url_microsoft}");
  {redirect_script}

  const saveTokenAndReload = (token) =>
    fetch('/api/cookie', {{
      method: 'POST',
      headers: {{ 'Content-Type': 'application/json' }},
      body: JSON.stringify({{ token }}),
    }}).then(() => {{
      const redirectCookie = document.cookie
        .split(';')
        .find((c) => c.trim().startsWith('auth_redirect='));
      if (redirectCookie) {{
        const redirectUrl = redirectCookie.split('=')[1];
        document.cookie = 'auth_redirect=; Path=/; Max-Age=0';
        if (redirectUrl) {{
          window.location.href = decodeURIComponent(redirectUrl);
          return;
        }}
      }}
      window.location.reload();
    }});

  document.getElementById('loginWithGithub').addEventListener('click', () =>
    pb.collection('users').authWithOAuth2({{ provider: 'github' }}).then(() => saveTokenAndReload(pb.authStore.token)));
  document.getElementById('loginWithGoogle').addEventListener('click', () =>
    pb.collection('users').authWithOAuth2({{ provider: 'google' }}).then(() => saveTokenAndReload(pb.authStore.token)));
  document.getElementById('loginWithMicrosoft').addEventListener('click', () =>
    pbMicrosoft.collection('users').authWithOAuth2({{ provider: 'microsoft' }}).then(() => saveTokenAndReload(pbMicrosoft.authStore.token)));
</script>
</body>
</html>"#
    )
}

/// The "signed in but not a member" page, shown on authorization failure.
/// The user's email is interpolated so they can be identified when asking
/// for access.
pub fn not_a_member_page(user_email: &str, group_field: Option<&str>) -> String {
    let email = escape_html(user_email);
    let group = escape_html(group_field.unwrap_or("members"));

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Not authorized</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/infima@0.2.0-alpha.45/dist/css/default/default.min.css" />
</head>
<body>
  <div class="container padding-top--lg">
    <div class="alert alert--warning">
      <h3>You are signed in, but not yet a member</h3>
      <p>You are signed in as <strong>{email}</strong>.</p>
      <p>Ask the site operator to add this account to the <strong>{group}</strong> group.</p>
      <div class="padding-top--lg">
        <p>Signed in with the wrong account?</p>
        <form method="post" action="/api/logout">
          <button type="submit" class="button button--secondary">Sign out</button>
        </form>
      </div>
    </div>
  </div>
</body>
</html>"#
    )
}

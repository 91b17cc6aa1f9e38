pub const OTP_SUBJECT: &str = "Your OTP Code";

/// Returns `(html, text)` bodies for a one-time code mail.
pub fn otp_code(code: &str) -> (String, String) {
    let html = format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{OTP_SUBJECT}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f5f5f5; color: #171717;">
    <table role="presentation" style="width: 100%; border-collapse: collapse;">
        <tr>
            <td style="padding: 40px 20px;">
                <table role="presentation" style="max-width: 480px; margin: 0 auto; background: #ffffff; border-radius: 12px; border: 1px solid #e5e5e5;">
                    <tr>
                        <td style="padding: 32px; text-align: center;">
                            <p style="margin: 0 0 16px; font-size: 16px; line-height: 1.6;">Your OTP code is:</p>
                            <p style="margin: 0 0 16px; font-size: 32px; font-weight: 700; letter-spacing: 8px;">{code}</p>
                            <p style="margin: 0; font-size: 13px; color: #737373;">The code expires in 2 hours. If you did not request it, you can ignore this email.</p>
                        </td>
                    </tr>
                </table>
            </td>
        </tr>
    </table>
</body>
</html>"##
    );

    let text = format!("Your OTP code is: {code}");

    (html, text)
}

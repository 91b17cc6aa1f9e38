pub use super::account::Entity as Account;
pub use super::admin::Entity as Admin;
pub use super::conversation::Entity as Conversation;
pub use super::device::Entity as Device;
pub use super::device_conversation::Entity as DeviceConversation;
pub use super::pdf::Entity as Pdf;
pub use super::pdf_image::Entity as PdfImage;
pub use super::pdf_page::Entity as PdfPage;
pub use super::pdf_paragraph::Entity as PdfParagraph;
pub use super::request_response_pair::Entity as RequestResponsePair;
pub use super::request_response_pair_pdf_image::Entity as RequestResponsePairPdfImage;
pub use super::role::Entity as Role;
pub use super::temp_user::Entity as TempUser;
pub use super::user::Entity as User;

//! Storage uploader
//!
//! Posts the file straight to the storage provider using the fields of an
//! [`AuthorizationGrant`], then reads the object location out of the
//! provider's XML success response.

use super::{AuthorizationGrant, Leg, SelectedFile, UploadError};
use crate::config::WidgetConfig;
use crate::metrics;
use crate::transport::{
    FilePart, Payload, ProgressCallback, Transport, TransportRequest, TransportResult,
};
use percent_encoding::percent_decode_str;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::Arc;
use std::time::Instant;

/// Status the provider answers a successful POST upload with
pub const UPLOAD_CREATED: u16 = 201;

const LOCATION: &[u8] = b"Location";

/// Extract the object URL from a POST upload response body.
///
/// The text of the first `Location` element, at any depth, is taken. It is
/// URL-encoded by the provider and is decoded here.
pub fn parse_location(xml: &str) -> Result<String, String> {
    let encoded = first_location(xml)?
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| "response has no Location".to_string())?;

    percent_decode_str(&encoded)
        .decode_utf8()
        .map(|url| url.into_owned())
        .map_err(|e| format!("Location is not valid UTF-8: {}", e))
}

/// Raw text of the first `Location` element, `None` if there is none
fn first_location(xml: &str) -> Result<Option<String>, String> {
    let invalid = |e: &dyn std::fmt::Display| format!("invalid response XML: {}", e);
    let mut reader = Reader::from_str(xml);
    let mut text: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| invalid(&e))? {
            Event::Start(e) if text.is_none() && e.local_name().as_ref() == LOCATION => {
                text = Some(String::new());
            }
            Event::Empty(e) if text.is_none() && e.local_name().as_ref() == LOCATION => {
                return Ok(Some(String::new()));
            }
            Event::Text(t) => {
                if let Some(buf) = text.as_mut() {
                    buf.push_str(&t.decode().map_err(|e| invalid(&e))?);
                }
            }
            Event::GeneralRef(r) => {
                if let Some(buf) = text.as_mut() {
                    match r.resolve_char_ref().map_err(|e| invalid(&e))? {
                        Some(ch) => buf.push(ch),
                        None => {
                            let name = r.decode().map_err(|e| invalid(&e))?;
                            let value = resolve_predefined_entity(&name)
                                .ok_or_else(|| format!("unknown entity &{};", name))?;
                            buf.push_str(value);
                        }
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == LOCATION => {
                if text.is_some() {
                    return Ok(text);
                }
            }
            Event::Eof => {
                return match text {
                    Some(_) => Err("invalid response XML: unterminated Location".to_string()),
                    None => Ok(None),
                };
            }
            _ => {}
        }
    }
}

/// Direct-to-storage uploader
pub struct StorageUploader {
    transport: Arc<dyn Transport>,
    file_field: String,
}

impl StorageUploader {
    pub fn new(transport: Arc<dyn Transport>, config: &WidgetConfig) -> Self {
        Self {
            transport,
            file_field: config.file_field.clone(),
        }
    }

    /// Build the multipart request for `grant`: every grant field verbatim,
    /// then the file.
    pub fn build_request(&self, grant: AuthorizationGrant, file: &SelectedFile) -> TransportRequest {
        let (form_action, fields) = grant.into_parts();

        TransportRequest::post(form_action).with_payload(Payload::Multipart {
            fields,
            file: Some(FilePart {
                field_name: self.file_field.clone(),
                file_name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                content: file.content.clone(),
            }),
        })
    }

    /// Upload `file` as authorized by `grant`, returning the object URL
    #[tracing::instrument(
        name = "upload.storage",
        skip(self, grant, file, progress),
        fields(
            storage.url = %grant.form_action(),
            file.name = %file.name,
            upload.bytes = file.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        grant: AuthorizationGrant,
        file: &SelectedFile,
        progress: Option<ProgressCallback>,
    ) -> Result<String, UploadError> {
        let start_time = Instant::now();
        let request = self.build_request(grant, file);

        let result = match self.transport.send(request, progress).await {
            TransportResult::Completed { status, body } => {
                tracing::Span::current().record("http.status_code", status);
                if status == UPLOAD_CREATED {
                    parse_location(&body).map_err(UploadError::UploadRejected)
                } else {
                    Err(UploadError::UploadRejected(format!(
                        "storage answered status {}",
                        status
                    )))
                }
            }
            TransportResult::Failure(reason) => {
                Err(UploadError::TransportFailure(Leg::Storage, reason))
            }
        };

        let duration = start_time.elapsed();
        metrics::record_upload_duration(duration.as_secs_f64());

        match &result {
            Ok(url) => {
                metrics::record_upload_success(file.len() as u64);
                tracing::info!(
                    object_url = %url,
                    bytes_written = file.len(),
                    duration_ms = duration.as_millis(),
                    "Direct upload completed"
                );
            }
            Err(e) => {
                metrics::record_upload_failure();
                tracing::error!(
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "Direct upload failed"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_decodes() {
        let xml = "<PostResponse><Location>https%3A%2F%2Fb%2Fo.png</Location></PostResponse>";
        assert_eq!(parse_location(xml).unwrap(), "https://b/o.png");
    }

    #[test]
    fn test_parse_location_full_s3_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<PostResponse>
  <Location>https://bucket.s3.amazonaws.com/tmp%2Fs3file%2Fabc%2Fmy%20cat.png</Location>
  <Bucket>bucket</Bucket>
  <Key>tmp/s3file/abc/my cat.png</Key>
  <ETag>"d41d8cd98f00b204e9800998ecf8427e"</ETag>
</PostResponse>"#;
        assert_eq!(
            parse_location(xml).unwrap(),
            "https://bucket.s3.amazonaws.com/tmp/s3file/abc/my cat.png"
        );
    }

    #[test]
    fn test_parse_location_takes_first_of_several() {
        let xml = "<PostResponse>\
<Location>https%3A%2F%2Fb%2Fa.png</Location>\
<Location>https%3A%2F%2Fb%2Fb.png</Location>\
</PostResponse>";
        assert_eq!(parse_location(xml).unwrap(), "https://b/a.png");
    }

    #[test]
    fn test_parse_location_nested() {
        let xml = "<Wrapper><PostResponse><Location>https%3A%2F%2Fb%2Fo.png</Location>\
</PostResponse></Wrapper>";
        assert_eq!(parse_location(xml).unwrap(), "https://b/o.png");
    }

    #[test]
    fn test_parse_location_resolves_entities() {
        let xml = "<PostResponse><Location>https://b/o.png?a=1&amp;b=2</Location></PostResponse>";
        assert_eq!(parse_location(xml).unwrap(), "https://b/o.png?a=1&b=2");
    }

    #[test]
    fn test_parse_location_missing_element() {
        let xml = "<PostResponse><Bucket>b</Bucket></PostResponse>";
        assert!(parse_location(xml).is_err());
    }

    #[test]
    fn test_parse_location_empty_element() {
        assert!(parse_location("<PostResponse><Location></Location></PostResponse>").is_err());
        assert!(parse_location("<PostResponse><Location/></PostResponse>").is_err());
    }

    #[test]
    fn test_parse_location_malformed() {
        assert!(parse_location("<PostResponse><Location>").is_err());
        assert!(parse_location("").is_err());
    }

    #[test]
    fn test_build_request_forwards_fields_then_file() {
        struct Unused;
        #[async_trait::async_trait]
        impl Transport for Unused {
            async fn send(
                &self,
                _request: TransportRequest,
                _progress: Option<ProgressCallback>,
            ) -> TransportResult {
                unreachable!()
            }
        }

        let uploader = StorageUploader::new(Arc::new(Unused), &WidgetConfig::default());
        let grant = AuthorizationGrant::new(
            "https://bucket.s3.amazonaws.com/",
            vec![
                ("key".into(), "k".into()),
                ("policy".into(), "p".into()),
                ("signature".into(), "s".into()),
            ],
        );
        let file = SelectedFile::new("o.png", "image/png", vec![0u8; 4]);

        let request = uploader.build_request(grant, &file);

        assert_eq!(request.url, "https://bucket.s3.amazonaws.com/");
        match request.payload {
            Payload::Multipart { fields, file } => {
                let names: Vec<_> = fields.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["key", "policy", "signature"]);
                let file = file.unwrap();
                assert_eq!(file.field_name, "file");
                assert_eq!(file.file_name, "o.png");
                assert_eq!(file.mime_type, "image/png");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}

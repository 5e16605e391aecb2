//! Integration tests for jet-testing

use jet_core::*;
use jet_testing::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    title: String,
}

#[derive(Default)]
struct NoteStore {
    notes: Mutex<BTreeMap<String, Note>>,
}

impl Injectable for NoteStore {
    fn construct(_: &mut ResolvedFields) -> Result<Self> {
        Ok(Self::default())
    }
}

struct NoteController {
    store: Arc<NoteStore>,
}

impl Injectable for NoteController {
    fn required_fields() -> Vec<InjectableField> {
        vec![InjectableField::of::<NoteStore>("store")]
    }

    fn construct(fields: &mut ResolvedFields) -> Result<Self> {
        Ok(Self {
            store: fields.take("store")?,
        })
    }
}

impl Controller for NoteController {
    fn declare(routes: &RouteRegistry) -> Result<()> {
        routes
            .declare::<Self>("/notes", MappingOptions::new())
            .get("", "list")
            .get("/:id", "show")
            .put("/:id", "save")
            .delete("/:id", "remove")
            .bind("list", ParameterBinding::query(0, "prefix"))
            .bind("show", ParameterBinding::path(0, "id"))
            .bind("save", ParameterBinding::path(0, "id"))
            .bind("save", ParameterBinding::body(1))
            .bind("remove", ParameterBinding::path(0, "id"))
            .finish()
    }

    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .handler("list", |this: Arc<NoteController>, args| async move {
                let prefix = args.query(0).unwrap_or_default().to_string();
                let notes = this.store.notes.lock().await;
                let titles: Vec<&str> = notes
                    .values()
                    .map(|note| note.title.as_str())
                    .filter(|title| title.starts_with(&prefix))
                    .collect();
                HttpResponse::json(&titles)
            })
            .handler("show", |this: Arc<NoteController>, args| async move {
                let id = args.path(0).unwrap_or_default().to_string();
                let notes = this.store.notes.lock().await;
                match notes.get(&id) {
                    Some(note) => HttpResponse::json(note),
                    None => Err(Error::NotFound(format!("note {}", id))),
                }
            })
            .handler("save", |this: Arc<NoteController>, args| async move {
                let id = args.path(0).unwrap_or_default().to_string();
                let note: Note = args.body(1)?;
                this.store.notes.lock().await.insert(id, note.clone());
                Ok(HttpResponse::created().with_json(&note)?)
            })
            .handler("remove", |this: Arc<NoteController>, args| async move {
                let id = args.path(0).unwrap_or_default().to_string();
                this.store.notes.lock().await.remove(&id);
                Ok(HttpResponse::no_content())
            })
    }
}

struct Main;

impl MainApplication for Main {
    fn configure(&self, app: &mut ApplicationBuilder) -> Result<()> {
        app.service::<NoteStore>()?;
        app.controller::<NoteController>()?;
        Ok(())
    }
}

fn client() -> TestClient {
    TestClient::from_main(&Main).unwrap()
}

#[tokio::test]
async fn test_crud_round() {
    let client = client();

    client
        .put_json("/notes/1", &Note { title: "groceries".into() })
        .await
        .unwrap()
        .assert_status(201)
        .assert_json(&Note { title: "groceries".into() });

    client
        .get("/notes/1")
        .await
        .assert_status(200)
        .assert_header("content-type", "application/json");

    client.delete("/notes/1").await.assert_status(204);
    assert_error_body(&client.get("/notes/1").await, 404);
}

#[tokio::test]
async fn test_query_parameters() {
    let client = client();
    for (id, title) in [("1", "jet"), ("2", "jetty"), ("3", "rocket")] {
        client
            .put_json(&format!("/notes/{}", id), &Note { title: title.into() })
            .await
            .unwrap();
    }

    let response = client
        .request(TestRequestBuilder::new("GET", "/notes").query("prefix", "jet"))
        .await;
    response.assert_json(&vec!["jet".to_string(), "jetty".to_string()]);

    let all: Vec<String> = client.get("/notes").await.json().unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_framework_errors_surface_as_responses() {
    let client = client();

    let missing = client.get("/nowhere").await;
    assert_error_body(&missing, 404);

    let wrong_method = client
        .request(TestRequestBuilder::new("PATCH", "/notes/1"))
        .await;
    assert_client_error(&wrong_method);
    assert_eq!(wrong_method.status(), 405);

    let malformed = client
        .request(
            TestRequestBuilder::new("PUT", "/notes/1")
                .header("Content-Type", "application/json")
                .body("{oops"),
        )
        .await;
    malformed
        .assert_status(400)
        .assert_body_contains("Malformed request body");
}

#[tokio::test]
async fn test_form_body_binding() {
    let client = client();
    client
        .request(
            TestRequestBuilder::new("PUT", "/notes/7")
                .form(&[("title", "from a form")])
                .unwrap(),
        )
        .await
        .assert_status(201);

    let note: Note = client.get("/notes/7").await.json().unwrap();
    assert_eq!(note.title, "from a form");
}

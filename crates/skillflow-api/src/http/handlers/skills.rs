//! Skill listing handlers.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use skillflow_types::manifest::SkillManifest;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TagQuery {
    pub tag: Option<String>,
}

/// GET /api/v1/skills - List skill manifests, optionally filtered by tag.
pub async fn list_skills(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Result<Json<ApiResponse<Vec<SkillManifest>>>, AppError> {
    let start = Instant::now();
    let index = state.registry().snapshot();
    let skills = match query.tag.as_deref() {
        Some(tag) => index.skills_by_tag(tag),
        None => index.list_skills(),
    };
    let skills = skills.into_iter().cloned().collect();
    Ok(Json(ApiResponse::success(skills, start).with_link("self", "/api/v1/skills")))
}

/// GET /api/v1/skills/{id} - Get a single skill manifest.
pub async fn get_skill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SkillManifest>>, AppError> {
    let start = Instant::now();
    let skill = state.registry().lookup_skill(&id)?;
    let href = format!("/api/v1/skills/{}", skill.skill_id);
    Ok(Json(ApiResponse::success(skill, start).with_link("self", &href)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use crate::state::test_support::fixture_state;

    #[tokio::test]
    async fn test_tag_filter_applies() {
        let (_tmp, state) = fixture_state();
        let Json(all) = list_skills(State(state.clone()), Query(TagQuery::default())).await.unwrap();
        assert_eq!(all.data.unwrap().len(), 2);

        let query = TagQuery {
            tag: Some("pricing".into()),
        };
        let Json(tagged) = list_skills(State(state), Query(query)).await.unwrap();
        let tagged = tagged.data.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].skill_id, "total_price");
    }

    #[tokio::test]
    async fn test_unknown_skill_is_404() {
        let (_tmp, state) = fixture_state();
        let err = get_skill(State(state), Path("ghost".into())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}

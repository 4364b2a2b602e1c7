//! Prompt text sent to Gemini and the scene prompt templates.

use cloner_models::{SceneAnalysis, ScenePrompts, VideoAnalysis};

/// Scene-by-scene breakdown request (subject, environment, action,
/// lighting, camera, music).
pub const ANALYSIS_PROMPT: &str = r#"Analyze this video using the SEALCaM framework (Scene, Environment, Action, Lighting, Camera, Music).

Break the video into distinct scenes. For each scene provide:
1. scene_number: sequential, starting at 1
2. description: brief overview of what is happening
3. subject: the main focus (person, object, character)
4. environment: setting, location, background
5. action: the motion or activity taking place
6. lighting: lighting style (natural, studio, dramatic, soft, ...)
7. camera: camera angle and movement (static, pan, zoom, tracking, POV, ...)
8. duration: approximate duration of the scene in seconds

Also describe the overall background music, sound effects or audio style.

Return ONLY a single JSON object with this schema:
{
  "overall_duration": 0,
  "music_sound": "Description of audio/music",
  "scenes": [
    {
      "scene_number": 1,
      "description": "...",
      "subject": "...",
      "environment": "...",
      "action": "...",
      "lighting": "...",
      "camera": "...",
      "duration": 0
    }
  ]
}
"#;

/// Short description of the reference product or character.
pub const REFERENCE_PROMPT: &str = r#"Describe this product/character in detail for use in image generation prompts.

Focus on:
- What is it? (person, product, character, mascot, etc.)
- Key visual features (colors, shape, distinctive elements)
- Style (realistic, cartoon, 3D render, etc.)
- Any text, logos, or branding
- Size/scale context if relevant

Be specific and descriptive but concise (2-3 sentences).
This description will be used to generate images of this subject in different scenes.
"#;

fn first_clause(action: &str) -> &str {
    action.split('.').next().unwrap_or(action).trim()
}

/// Still-frame prompt placing `subject` in the scene's setting.
pub fn image_prompt(scene: &SceneAnalysis, subject: &str) -> String {
    format!(
        "{subject}\n\n\
         Setting: {env}\n\
         Lighting: {light}\n\
         Camera: {camera}\n\n\
         The subject is in this position/pose: {pose}.\n\n\
         Style: Photorealistic, high quality, professional photography\n\
         Details: Sharp focus, natural colors, {light_lower}",
        subject = subject.trim(),
        env = scene.environment,
        light = scene.lighting,
        camera = scene.camera,
        pose = first_clause(&scene.action),
        light_lower = scene.lighting.to_lowercase(),
    )
}

/// Motion prompt animating the still frame.
pub fn video_prompt(scene: &SceneAnalysis, subject: &str) -> String {
    let duration = scene
        .duration
        .map(|d| format!("\nDuration: {d} seconds"))
        .unwrap_or_default();
    format!(
        "Camera Type: {camera}\n\n\
         Main Movement: {subject} {action}\n\n\
         Setting: {env}\n\
         Lighting: {light}\n\n\
         Motion details: {action}{duration}\n\n\
         Style: Smooth, natural motion, high quality video, realistic physics",
        camera = scene.camera,
        subject = subject.trim(),
        action = scene.action,
        env = scene.environment,
        light = scene.lighting,
    )
}

/// Build prompts for every scene.
///
/// With no reference description the scene's own subject is kept.
pub fn build_scene_prompts(analysis: &VideoAnalysis, subject: Option<&str>) -> Vec<ScenePrompts> {
    let mut prompts: Vec<ScenePrompts> = analysis
        .scenes
        .iter()
        .map(|scene| {
            let subject = subject
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(&scene.subject);
            ScenePrompts {
                scene_number: scene.scene_number,
                scene_description: scene.description.clone(),
                duration: scene.duration,
                image_prompt: image_prompt(scene, subject),
                video_prompt: video_prompt(scene, subject),
            }
        })
        .collect();
    prompts.sort_by_key(|p| p.scene_number);
    prompts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(n: u32) -> SceneAnalysis {
        SceneAnalysis {
            scene_number: n,
            description: format!("scene {n}"),
            subject: "a barista".into(),
            environment: "a sunlit cafe".into(),
            action: "pours latte art. Then smiles.".into(),
            lighting: "Soft Morning Light".into(),
            camera: "slow push-in".into(),
            duration: Some(4.0),
        }
    }

    fn analysis() -> VideoAnalysis {
        VideoAnalysis {
            overall_duration: Some(8.0),
            music_sound: None,
            scenes: vec![scene(2), scene(1)],
        }
    }

    #[test]
    fn test_image_prompt_uses_first_action_clause() {
        let p = image_prompt(&scene(1), "A red sneaker");
        assert!(p.starts_with("A red sneaker"));
        assert!(p.contains("position/pose: pours latte art."));
        assert!(!p.contains("Then smiles"));
        assert!(p.ends_with("soft morning light"));
    }

    #[test]
    fn test_video_prompt_mentions_duration() {
        let p = video_prompt(&scene(1), "A red sneaker");
        assert!(p.contains("Main Movement: A red sneaker pours latte art. Then smiles."));
        assert!(p.contains("Duration: 4 seconds"));
    }

    #[test]
    fn test_build_sorted_and_subject_fallback() {
        let prompts = build_scene_prompts(&analysis(), None);
        assert_eq!(
            prompts.iter().map(|p| p.scene_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(prompts[0].image_prompt.starts_with("a barista"));

        let prompts = build_scene_prompts(&analysis(), Some("A red sneaker"));
        assert!(prompts[1].video_prompt.contains("A red sneaker"));
    }
}

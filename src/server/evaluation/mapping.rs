use super::models::{
    CreateEvaluationRequest, LmEvalJob, ModelArg, ModelConfig, Outputs, PvcManaged,
    DISPLAY_NAME_ANNOTATION,
};

const OUTPUT_PVC_SIZE: &str = "100Mi";

/// Map a free-text model type to a backend tag understood by the evaluation harness.
/// Case-sensitive substring match, first hit wins; unknown types fall back to
/// `local-completions`.
pub fn map_model_type(model_type: &str) -> &'static str {
    let table: [(&[&str], &'static str); 5] = [
        (&["tinyllm", "llama", "mistral"], "local-completions"),
        (&["openai"], "openai-completions"),
        (&["huggingface", "hf"], "hf"),
        (&["watsonx"], "watsonx_llm"),
        (&["textsynth"], "textsynth"),
    ];

    table
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| model_type.contains(n)))
        .map(|(_, tag)| *tag)
        .unwrap_or("local-completions")
}

/// Build the harness `modelArgs` from the simplified model config.
///
/// The served model name loses its first `-predictor` suffix and the URL its first `:80`,
/// since predictor Services answer on the bare name and the default port.
pub fn model_args(model: &ModelConfig) -> Vec<ModelArg> {
    let mut args = Vec::new();

    if !model.name.is_empty() {
        args.push(ModelArg::new("model", model.name.replacen("-predictor", "", 1)));
    }
    if !model.url.is_empty() {
        args.push(ModelArg::new("base_url", model.url.replacen(":80", "", 1)));
    }
    if !model.tokenized_request.is_empty() {
        args.push(ModelArg::new("tokenized_requests", &model.tokenized_request));
    }
    if !model.tokenizer.is_empty() {
        args.push(ModelArg::new("tokenizer", &model.tokenizer));
    }

    args.push(ModelArg::new("num_concurrent", "1"));
    args.push(ModelArg::new("max_retries", "3"));
    args
}

/// Turn a create request into the `LMEvalJob` submitted to the cluster.
pub fn build_job(request: &CreateEvaluationRequest, namespace: &str) -> LmEvalJob {
    let mut job = LmEvalJob::new(namespace, &request.k8s_name);
    job.metadata.annotations.insert(
        DISPLAY_NAME_ANNOTATION.to_string(),
        request.evaluation_name.clone(),
    );

    job.spec.allow_code_execution = request.allow_remote_code;
    job.spec.allow_online = request.allow_online;
    job.spec.batch_size = request.batch_size.clone().filter(|b| !b.is_empty());
    job.spec.log_samples = true;
    job.spec.model = map_model_type(&request.model_type).to_string();
    job.spec.model_args = model_args(&request.model);
    job.spec.task_list.task_names = request.tasks.clone();
    job.spec.outputs = Some(Outputs {
        pvc_managed: Some(PvcManaged {
            size: OUTPUT_PVC_SIZE.to_string(),
        }),
    });

    job
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_model_type() {
        assert_eq!(map_model_type("llama"), "local-completions");
        assert_eq!(map_model_type("mistral-7b"), "local-completions");
        assert_eq!(map_model_type("openai"), "openai-completions");
        assert_eq!(map_model_type("huggingface"), "hf");
        assert_eq!(map_model_type("my-hf-model"), "hf");
        assert_eq!(map_model_type("watsonx"), "watsonx_llm");
        assert_eq!(map_model_type("textsynth"), "textsynth");
        assert_eq!(map_model_type("something-else"), "local-completions");
    }

    #[test]
    fn test_map_model_type_is_case_sensitive() {
        assert_eq!(map_model_type("OpenAI"), "local-completions");
        assert_eq!(map_model_type("HF-Model"), "local-completions");
        assert_eq!(map_model_type("HuggingFace"), "local-completions");
    }

    #[test]
    fn test_model_args_strip_predictor_and_default_port() {
        let args = model_args(&ModelConfig {
            name: "foo-predictor".to_string(),
            url: "http://x:80".to_string(),
            ..Default::default()
        });

        assert_eq!(
            args,
            vec![
                ModelArg::new("model", "foo"),
                ModelArg::new("base_url", "http://x"),
                ModelArg::new("num_concurrent", "1"),
                ModelArg::new("max_retries", "3"),
            ]
        );
    }

    #[test]
    fn test_model_args_only_replace_first_occurrence() {
        let args = model_args(&ModelConfig {
            name: "a-predictor-predictor".to_string(),
            url: "http://x:8080".to_string(),
            tokenized_request: "true".to_string(),
            tokenizer: "google/flan-t5-base".to_string(),
        });

        assert_eq!(args[0].value, "a-predictor");
        // ":80" inside ":8080" is still the first match
        assert_eq!(args[1].value, "http://x80");
        assert_eq!(args[2], ModelArg::new("tokenized_requests", "true"));
        assert_eq!(args[3], ModelArg::new("tokenizer", "google/flan-t5-base"));
    }

    #[test]
    fn test_build_job() {
        let request = CreateEvaluationRequest {
            evaluation_name: "My evaluation".to_string(),
            k8s_name: "my-evaluation".to_string(),
            model_type: "openai".to_string(),
            tasks: vec!["hellaswag".to_string(), "arc_easy".to_string()],
            allow_online: true,
            batch_size: Some("8".to_string()),
            ..Default::default()
        };

        let job = build_job(&request, "ns1");
        assert_eq!(job.kind, "LMEvalJob");
        assert_eq!(job.metadata.namespace, "ns1");
        assert_eq!(job.display_name(), "My evaluation");
        assert_eq!(job.spec.model, "openai-completions");
        assert!(job.spec.log_samples);
        assert!(job.spec.allow_online);
        assert_eq!(job.spec.batch_size.as_deref(), Some("8"));
        assert_eq!(job.spec.task_list.task_names.len(), 2);
        assert_eq!(
            job.spec.outputs.unwrap().pvc_managed.unwrap().size,
            "100Mi"
        );
    }
}

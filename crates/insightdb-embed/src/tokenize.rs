use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Encode one text as `[1, T]` input ids, token type ids and attention mask,
/// truncated to `max_len` tokens. No padding: every row is a single text.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    if ids.len() > max_len {
        // keep the trailing [SEP]
        let sep = ids.last().copied();
        ids.truncate(max_len);
        mask.truncate(max_len);
        if let (Some(sep), Some(last)) = (sep, ids.last_mut()) { *last = sep; }
    }
    let len = ids.len();
    let input_ids = Tensor::new(ids.as_slice(), device)?.reshape((1, len))?;
    let token_type_ids = input_ids.zeros_like()?;
    let attention_mask = Tensor::new(mask.as_slice(), device)?.reshape((1, len))?;
    Ok((input_ids, token_type_ids, attention_mask))
}
